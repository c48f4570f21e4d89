use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{order, order::OrderStatus, Order},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Transition rules for the order lifecycle.
///
/// Forward chain: PendingPayment, Placed, Packed, Shipped, OutForDelivery,
/// Delivered. PaymentFailed is reachable only from PendingPayment. Cancelled
/// and Returned are reachable from any non-terminal state via staff action.
/// Transitions are monotonic: nothing moves an order backward.
pub struct OrderStateMachine;

impl OrderStateMachine {
    pub fn is_terminal(status: OrderStatus) -> bool {
        matches!(
            status,
            OrderStatus::Delivered
                | OrderStatus::PaymentFailed
                | OrderStatus::Cancelled
                | OrderStatus::Returned
        )
    }

    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;

        if from == to || Self::is_terminal(from) {
            return false;
        }
        match (from, to) {
            (PendingPayment, Placed) | (PendingPayment, PaymentFailed) => true,
            (Placed, Packed) => true,
            (Packed, Shipped) => true,
            (Shipped, OutForDelivery) => true,
            (OutForDelivery, Delivered) => true,
            (_, Cancelled) | (_, Returned) => true,
            _ => false,
        }
    }
}

/// Staff-driven post-commit order lifecycle.
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Moves a single order to `new_status`, rejecting invalid transitions.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if !OrderStateMachine::can_transition(old_status, new_status) {
            txn.rollback().await?;
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition order {} from {} to {}",
                order_id, old_status, new_status
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(%order_id, %old_status, %new_status, "order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;

        Ok(updated)
    }

    /// Applies `new_status` to every order in the set where the transition is
    /// forward-valid, skipping the rest. Returns the count updated.
    #[instrument(skip(self, order_ids))]
    pub async fn bulk_update_status(
        &self,
        order_ids: &[Uuid],
        new_status: OrderStatus,
    ) -> Result<u64, ServiceError> {
        let mut updated = 0u64;
        for &order_id in order_ids {
            match self.update_status(order_id, new_status).await {
                Ok(_) => updated += 1,
                Err(ServiceError::InvalidOperation(reason)) => {
                    warn!(%order_id, %reason, "skipping order in bulk update");
                }
                Err(ServiceError::NotFound(reason)) => {
                    warn!(%order_id, %reason, "skipping order in bulk update");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(updated)
    }
}
