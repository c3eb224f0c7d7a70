use sea_orm::entity::prelude::*;

/// A concrete screening slot under a showtime. `time` is zero-padded 24-hour
/// `HH:mm`, local to the cinema.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "showtime_detail")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub showtime_id: i32,
    pub time: String,
    pub price: Option<String>,
    pub order_link: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
