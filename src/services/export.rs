use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    entities::{order, Order},
    errors::ServiceError,
};

/// Read-only CSV export of orders for back-office reporting. Performs no
/// writes.
pub struct OrderExporter {
    db: Arc<DatabaseConnection>,
}

impl OrderExporter {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Renders every order as CSV, oldest first.
    #[instrument(skip(self))]
    pub async fn orders_csv(&self) -> Result<String, ServiceError> {
        let orders = Order::find()
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut csv = String::from(
            "order_id,gateway_order_id,customer_name,customer_email,phone,address,city,postal_code,status,payment_status,total_amount,currency,created_at\n",
        );
        for o in orders {
            let fields = [
                o.id.to_string(),
                o.gateway_order_id,
                o.customer_name,
                o.customer_email,
                o.phone,
                o.address,
                o.city,
                o.postal_code,
                o.status.to_string(),
                o.payment_status.to_string(),
                o.total_amount.to_string(),
                o.currency,
                o.created_at.to_rfc3339(),
            ];
            let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
            csv.push_str(&row.join(","));
            csv.push('\n');
        }
        Ok(csv)
    }
}

/// Quotes a field when it contains a comma, quote, or newline; embedded
/// quotes are doubled per RFC 4180.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
