use sea_orm::entity::prelude::*;
use std::str::FromStr;

#[derive(EnumIter, DeriveActiveEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum Status {
    Pending = 0,
    Success = 1,
    Failed = 2,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Failed => "failed",
        }
    }
}

/// What caused a publish attempt
#[derive(EnumIter, DeriveActiveEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum Trigger {
    Submission = 0,
    Approval = 1,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Submission => "submission",
            Trigger::Approval => "approval",
        }
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submission" => Ok(Trigger::Submission),
            "approval" => Ok(Trigger::Approval),
            _ => Err(format!("unknown publish trigger: {}", s)),
        }
    }
}

/// Nostr publish attempts of submissions
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "publish_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub submission_id: i32,

    pub trigger: Trigger,

    pub status: Status,

    /// hex nostr event id
    pub event_id: Option<String>,

    /// json array of the targeted relay urls
    #[sea_orm(column_type = "Text")]
    pub relays: String,

    /// json array of per relay outcomes
    #[sea_orm(column_type = "Text")]
    pub relay_statuses: String,

    pub retries: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,

    pub published_at: Option<i64>,

    /// data create time
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
