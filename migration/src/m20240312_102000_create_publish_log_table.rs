use entity::publish_log;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(publish_log::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(publish_log::Column::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(publish_log::Column::SubmissionId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(publish_log::Column::Trigger)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(publish_log::Column::Status)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(publish_log::Column::EventId).string_len(64))
                    .col(
                        ColumnDef::new(publish_log::Column::Relays)
                            .text()
                            .not_null()
                            .default("[]".to_owned()),
                    )
                    .col(
                        ColumnDef::new(publish_log::Column::RelayStatuses)
                            .text()
                            .not_null()
                            .default("[]".to_owned()),
                    )
                    .col(
                        ColumnDef::new(publish_log::Column::Retries)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(publish_log::Column::LastError).text())
                    .col(ColumnDef::new(publish_log::Column::PublishedAt).big_integer())
                    .col(
                        ColumnDef::new(publish_log::Column::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(publish_log::Column::UpdatedAt)
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
                    .name("idx_publish_log_submission")
                    .col(publish_log::Column::SubmissionId)
                    .col(publish_log::Column::Trigger)
                    .col(publish_log::Column::Status)
                    .table(publish_log::Entity)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_publish_log_submission").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(publish_log::Entity).to_owned())
            .await
    }
}
