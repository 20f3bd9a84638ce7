use sea_orm::entity::prelude::*;

/// Nostr publish jobs abandoned after exhausting retries
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "nostr_dead_letters")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// none if the job can't be mapped back to a submission
    pub submission_id: Option<i32>,

    pub job_id: String,

    /// origin job payload json
    #[sea_orm(column_type = "Text")]
    pub payload: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,

    pub retries: i32,

    /// data create time
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
