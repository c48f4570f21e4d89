use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::order::OrderStatus;

/// One checkout attempt: the persisted bridge between gateway intent creation
/// and the asynchronous payment callback. Holds the priced quote lines so the
/// commit charges exactly what the gateway was told. Starts in
/// `PendingPayment` and ends in `Placed` or `PaymentFailed`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "checkout_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub gateway_order_id: String,
    pub session_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub phone: String,
    #[sea_orm(column_type = "Text")]
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total_amount: Decimal,
    /// Priced quote lines, serialized `Vec<PricedLine>`.
    #[sea_orm(column_type = "Json")]
    pub lines: Json,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
