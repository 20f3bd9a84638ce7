use entity::dead_letter;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(dead_letter::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(dead_letter::Column::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(dead_letter::Column::SubmissionId).integer())
                    .col(
                        ColumnDef::new(dead_letter::Column::JobId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(dead_letter::Column::Payload).text().not_null())
                    .col(ColumnDef::new(dead_letter::Column::Error).text())
                    .col(
                        ColumnDef::new(dead_letter::Column::Retries)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(dead_letter::Column::CreatedAt)
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
                    .name("uq_dead_letter_job_id")
                    .col(dead_letter::Column::JobId)
                    .table(dead_letter::Entity)
                    .unique()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_dead_letter_job_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(dead_letter::Entity).to_owned())
            .await
    }
}
