use sea_orm::entity::prelude::*;

/// One film playing at one cinema on one calendar day. The date is stored as
/// an ISO `YYYY-MM-DD` string, so string range filters order correctly.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "showtime")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub film_id: i32,
    pub cinema_id: i32,
    pub date: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
