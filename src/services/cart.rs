use dashmap::DashMap;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    entities::{product, Product},
    errors::{ServiceError, ShortageLine, StockShortage},
};

/// One desired line of a cart: product and quantity, nothing else. Arbitrary
/// shapes are rejected at the boundary by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Ephemeral per-session cart store.
///
/// The cart is advisory: concurrent requests for the same session are
/// last-write-wins and quantities here are only a best-effort reservation.
/// The authoritative stock check happens at commit time in the ledger.
/// The session id is an explicit argument to every operation; there is no
/// ambient session state.
pub struct CartStore {
    db: Arc<DatabaseConnection>,
    carts: DashMap<String, Vec<CartLine>>,
}

impl CartStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            carts: DashMap::new(),
        }
    }

    /// Adds a quantity of a product, merging with any existing line.
    ///
    /// Rejects (rather than silently truncating) when the merged quantity
    /// would exceed the product's current stock.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        session_id: &str,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let product = self.load_available_product(product_id).await?;

        let mut lines = self.carts.entry(session_id.to_string()).or_default();
        let existing = lines
            .iter()
            .find(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .unwrap_or(0);
        let merged = existing.saturating_add(quantity);

        if merged > product.stock {
            let mut shortage = StockShortage::default();
            shortage.push(ShortageLine {
                product_id,
                product_name: product.name,
                requested: merged,
                available: product.stock.max(0),
            });
            return Err(ServiceError::StockShortage(shortage));
        }

        if let Some(line) = lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = merged;
        } else {
            lines.push(CartLine {
                product_id,
                quantity: merged,
            });
        }

        Ok(())
    }

    /// Sets the quantity of an existing line. Zero removes the line.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        session_id: &str,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            self.remove(session_id, product_id);
            return Ok(());
        }

        let product = self.load_available_product(product_id).await?;
        if quantity > product.stock {
            let mut shortage = StockShortage::default();
            shortage.push(ShortageLine {
                product_id,
                product_name: product.name,
                requested: quantity,
                available: product.stock.max(0),
            });
            return Err(ServiceError::StockShortage(shortage));
        }

        let mut lines = self.carts.entry(session_id.to_string()).or_default();
        if let Some(line) = lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = quantity;
        } else {
            lines.push(CartLine {
                product_id,
                quantity,
            });
        }
        Ok(())
    }

    /// Removes a single line.
    pub fn remove(&self, session_id: &str, product_id: Uuid) {
        if let Some(mut lines) = self.carts.get_mut(session_id) {
            lines.retain(|l| l.product_id != product_id);
        }
    }

    /// Destroys the session's cart.
    pub fn clear(&self, session_id: &str) {
        self.carts.remove(session_id);
    }

    /// Returns an immutable, ordered snapshot of (product, quantity) pairs.
    ///
    /// Lines whose product no longer exists or is unavailable are silently
    /// dropped, and the pruning is persisted back to the store.
    #[instrument(skip(self))]
    pub async fn snapshot(
        &self,
        session_id: &str,
    ) -> Result<Vec<(product::Model, i32)>, ServiceError> {
        let lines = self
            .carts
            .get(session_id)
            .map(|l| l.clone())
            .unwrap_or_default();

        let mut kept_lines = Vec::with_capacity(lines.len());
        let mut pairs = Vec::with_capacity(lines.len());

        for line in &lines {
            match Product::find_by_id(line.product_id).one(&*self.db).await? {
                Some(product) if product.available => {
                    kept_lines.push(*line);
                    pairs.push((product, line.quantity));
                }
                _ => {
                    debug!(
                        product_id = %line.product_id,
                        "pruning cart line for missing or unavailable product"
                    );
                }
            }
        }

        if kept_lines.len() != lines.len() {
            if kept_lines.is_empty() {
                self.carts.remove(session_id);
            } else {
                self.carts.insert(session_id.to_string(), kept_lines);
            }
        }

        Ok(pairs)
    }

    async fn load_available_product(
        &self,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if !product.available {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not available",
                product_id
            )));
        }
        Ok(product)
    }
}
