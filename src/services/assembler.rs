use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::product,
    errors::{ServiceError, ShortageLine, StockShortage},
    services::pricing,
};

/// One priced, validated line of a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// A priced, validated, not-yet-persisted order proposal. Its total is the
/// exact amount the payment gateway will be asked to charge.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderIntent {
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Turns a cart snapshot into an [`OrderIntent`].
///
/// Quote is separated from commit because the gateway must be told an exact
/// amount before the buyer pays, while the final stock check can only happen
/// after payment is confirmed. Stock may change in between; the ledger
/// repeats the check under the commit transaction.
///
/// Rejects an empty cart, and rejects (without clamping) any line whose
/// quantity exceeds current stock, enumerating every offending product.
pub fn quote(
    snapshot: &[(product::Model, i32)],
    currency: &str,
) -> Result<OrderIntent, ServiceError> {
    if snapshot.is_empty() {
        return Err(ServiceError::ValidationError("cart is empty".to_string()));
    }

    let mut shortage = StockShortage::default();
    let mut lines = Vec::with_capacity(snapshot.len());

    for (product, quantity) in snapshot {
        if *quantity > product.stock {
            shortage.push(ShortageLine {
                product_id: product.id,
                product_name: product.name.clone(),
                requested: *quantity,
                available: product.stock.max(0),
            });
            continue;
        }

        let unit_price = pricing::resolve_unit_price(product);
        lines.push(PricedLine {
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price,
            quantity: *quantity,
            line_total: unit_price * Decimal::from(*quantity),
        });
    }

    if !shortage.is_empty() {
        return Err(ServiceError::StockShortage(shortage));
    }

    let total = lines.iter().map(|l| l.line_total).sum();

    Ok(OrderIntent {
        lines,
        total,
        currency: currency.to_string(),
        created_at: Utc::now(),
    })
}
