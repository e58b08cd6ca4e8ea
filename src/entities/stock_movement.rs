use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementReason {
    Order,
    PurchaseOrder,
    Adjustment,
}

/// Append-only journal row. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub uuid: Uuid,
    pub owner_id: i32,
    pub outlet_id: i32,
    pub product_id: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub delta: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity_after: Decimal,
    pub reason: String,
    pub reference: String,
    pub note: Option<String>,
    pub created_at: DateTimeUtc,
    pub created_by: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
