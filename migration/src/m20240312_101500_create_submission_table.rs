use entity::submission;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(submission::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(submission::Column::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(submission::Column::Status)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(submission::Column::Name).string().not_null())
                    .col(ColumnDef::new(submission::Column::Category).string())
                    .col(ColumnDef::new(submission::Column::Street).string())
                    .col(ColumnDef::new(submission::Column::City).string())
                    .col(ColumnDef::new(submission::Column::State).string())
                    .col(ColumnDef::new(submission::Column::Postcode).string())
                    .col(ColumnDef::new(submission::Column::Country).string())
                    .col(ColumnDef::new(submission::Column::Latitude).double())
                    .col(ColumnDef::new(submission::Column::Longitude).double())
                    .col(ColumnDef::new(submission::Column::Website).string())
                    .col(ColumnDef::new(submission::Column::Phone).string())
                    .col(ColumnDef::new(submission::Column::Email).string())
                    .col(
                        ColumnDef::new(submission::Column::BitcoinDetails)
                            .text()
                            .not_null()
                            .default("{}".to_owned()),
                    )
                    .col(ColumnDef::new(submission::Column::Notes).text())
                    .col(
                        ColumnDef::new(submission::Column::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(submission::Column::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_submission_status")
                    .col(submission::Column::Status)
                    .table(submission::Entity)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_submission_status").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(submission::Entity).to_owned())
            .await
    }
}
