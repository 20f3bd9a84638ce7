pub use sea_orm_migration::prelude::*;

mod m20240312_101500_create_submission_table;
mod m20240312_102000_create_publish_log_table;
mod m20240312_102500_create_dead_letter_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240312_101500_create_submission_table::Migration),
            Box::new(m20240312_102000_create_publish_log_table::Migration),
            Box::new(m20240312_102500_create_dead_letter_table::Migration),
        ]
    }
}
