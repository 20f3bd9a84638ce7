use sea_orm::entity::prelude::*;

#[derive(EnumIter, DeriveActiveEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum Status {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
}

/// Business listing submitted by the public form
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub status: Status,

    /// business name
    pub name: String,

    pub category: Option<String>,

    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,

    /// bitcoin acceptance details json, onchain / lightning / etc.
    #[sea_orm(column_type = "Text")]
    pub bitcoin_details: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    /// data create time
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
