use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        checkout_attempt, order,
        order::{OrderStatus, PaymentStatus},
        order_item, product, CheckoutAttempt, Order, OrderItem, Product,
    },
    errors::{ServiceError, ShortageLine, StockShortage},
    events::{Event, EventSender},
    services::{assembler::PricedLine, cart::CartStore},
};

/// Result of a commit attempt.
#[derive(Debug)]
pub enum CommitOutcome {
    /// Stock was decremented and the order written in this call.
    Committed(order::Model),
    /// A paid order already existed for this gateway order id; duplicate
    /// callback, nothing changed.
    AlreadyCommitted(order::Model),
}

impl CommitOutcome {
    pub fn order(&self) -> &order::Model {
        match self {
            Self::Committed(order) | Self::AlreadyCommitted(order) => order,
        }
    }
}

/// Commits verified payments: the only writer of orders and the only code
/// that decrements stock.
///
/// All mutation happens inside one transaction. The stock re-check is a
/// conditional decrement (`stock = stock - qty WHERE stock >= qty`) per line,
/// so two buyers racing for the last unit serialize on the product row and
/// exactly one wins. Any line failing the check rolls the whole transaction
/// back with no observable side effects.
pub struct StockLedger {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    carts: Arc<CartStore>,
}

impl StockLedger {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, carts: Arc<CartStore>) -> Self {
        Self {
            db,
            event_sender,
            carts,
        }
    }

    /// Commits the checkout attempt identified by `gateway_order_id`.
    ///
    /// Idempotent: a duplicate callback for an already-paid order returns the
    /// existing order unchanged. Uniqueness of `gateway_order_id` across
    /// orders is enforced by the schema.
    #[instrument(skip(self))]
    pub async fn commit(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
    ) -> Result<CommitOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        match self
            .commit_in_txn(&txn, gateway_order_id, gateway_payment_id)
            .await
        {
            Ok((outcome, session_id)) => {
                txn.commit().await?;
                if let CommitOutcome::Committed(order) = &outcome {
                    if let Some(session_id) = session_id {
                        self.carts.clear(&session_id);
                    }
                    info!(order_id = %order.id, %gateway_order_id, "order committed");
                    self.event_sender.send_or_log(Event::OrderPlaced(order.id)).await;
                }
                Ok(outcome)
            }
            Err(err) => {
                txn.rollback().await?;
                // Two callbacks for the same payment can race past the guard;
                // the loser's insert trips the unique gateway_order_id. That
                // is the idempotent case, not a failure: return the winner's
                // order.
                if is_unique_violation(&err) {
                    if let Some(existing) = Order::find()
                        .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
                        .one(&*self.db)
                        .await?
                    {
                        if existing.payment_status == PaymentStatus::Paid {
                            info!(order_id = %existing.id, %gateway_order_id, "lost commit race, order already paid");
                            return Ok(CommitOutcome::AlreadyCommitted(existing));
                        }
                    }
                }
                Err(err)
            }
        }
    }

    async fn commit_in_txn(
        &self,
        txn: &DatabaseTransaction,
        gateway_order_id: &str,
        gateway_payment_id: &str,
    ) -> Result<(CommitOutcome, Option<String>), ServiceError> {
        if let Some(existing) = Order::find()
            .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
            .one(txn)
            .await?
        {
            if existing.payment_status == PaymentStatus::Paid {
                info!(order_id = %existing.id, %gateway_order_id, "duplicate callback, order already paid");
                return Ok((CommitOutcome::AlreadyCommitted(existing), None));
            }
            // An earlier attempt stopped partway. Finish it: decrement and
            // the Paid flip land together or not at all.
            return self
                .finish_partial_commit(txn, existing, gateway_payment_id)
                .await;
        }

        let attempt = self.load_attempt(txn, gateway_order_id).await?;
        let lines = parse_lines(&attempt)?;

        decrement_stock(txn, &lines).await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let new_order = order::ActiveModel {
            id: Set(order_id),
            gateway_order_id: Set(attempt.gateway_order_id.clone()),
            gateway_payment_id: Set(Some(gateway_payment_id.to_string())),
            customer_name: Set(attempt.customer_name.clone()),
            customer_email: Set(attempt.customer_email.clone()),
            phone: Set(attempt.phone.clone()),
            address: Set(attempt.address.clone()),
            city: Set(attempt.city.clone()),
            postal_code: Set(attempt.postal_code.clone()),
            status: Set(OrderStatus::Placed),
            payment_status: Set(PaymentStatus::Paid),
            total_amount: Set(attempt.total_amount),
            currency: Set(attempt.currency.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = new_order.insert(txn).await?;

        insert_items(txn, order_id, &lines).await?;
        let session_id = attempt.session_id.clone();
        mark_attempt(txn, attempt, OrderStatus::Placed).await?;

        Ok((CommitOutcome::Committed(order), Some(session_id)))
    }

    async fn finish_partial_commit(
        &self,
        txn: &DatabaseTransaction,
        existing: order::Model,
        gateway_payment_id: &str,
    ) -> Result<(CommitOutcome, Option<String>), ServiceError> {
        let attempt = self
            .load_attempt(txn, &existing.gateway_order_id)
            .await?;
        let lines = parse_lines(&attempt)?;

        decrement_stock(txn, &lines).await?;

        let has_items = !OrderItem::find()
            .filter(order_item::Column::OrderId.eq(existing.id))
            .all(txn)
            .await?
            .is_empty();
        if !has_items {
            insert_items(txn, existing.id, &lines).await?;
        }

        let session_id = attempt.session_id.clone();
        let mut active: order::ActiveModel = existing.into();
        active.status = Set(OrderStatus::Placed);
        active.payment_status = Set(PaymentStatus::Paid);
        active.gateway_payment_id = Set(Some(gateway_payment_id.to_string()));
        active.updated_at = Set(Utc::now());
        let order = active.update(txn).await?;

        mark_attempt(txn, attempt, OrderStatus::Placed).await?;

        Ok((CommitOutcome::Committed(order), Some(session_id)))
    }

    async fn load_attempt(
        &self,
        txn: &DatabaseTransaction,
        gateway_order_id: &str,
    ) -> Result<checkout_attempt::Model, ServiceError> {
        CheckoutAttempt::find()
            .filter(checkout_attempt::Column::GatewayOrderId.eq(gateway_order_id))
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No checkout attempt for gateway order {}",
                    gateway_order_id
                ))
            })
    }
}

fn is_unique_violation(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::DatabaseError(db_err)
            if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    )
}

fn parse_lines(attempt: &checkout_attempt::Model) -> Result<Vec<PricedLine>, ServiceError> {
    serde_json::from_value(attempt.lines.clone())
        .map_err(|e| ServiceError::InternalError(format!("corrupt attempt lines: {}", e)))
}

/// Conditionally decrements stock for every line, collecting shortfalls.
/// Runs inside the caller's transaction; on shortage the caller rolls back,
/// undoing any decrements already applied.
async fn decrement_stock(
    txn: &DatabaseTransaction,
    lines: &[PricedLine],
) -> Result<(), ServiceError> {
    let mut shortage = StockShortage::default();

    for line in lines {
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(line.quantity),
            )
            .filter(product::Column::Id.eq(line.product_id))
            .filter(product::Column::Stock.gte(line.quantity))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            let available = Product::find_by_id(line.product_id)
                .one(txn)
                .await?
                .map(|p| p.stock.max(0))
                .unwrap_or(0);
            shortage.push(ShortageLine {
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                requested: line.quantity,
                available,
            });
        }
    }

    if shortage.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::StockShortage(shortage))
    }
}

async fn insert_items(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    lines: &[PricedLine],
) -> Result<(), ServiceError> {
    let now = Utc::now();
    for line in lines {
        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            price: Set(line.unit_price),
            quantity: Set(line.quantity),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

async fn mark_attempt(
    txn: &DatabaseTransaction,
    attempt: checkout_attempt::Model,
    status: OrderStatus,
) -> Result<(), ServiceError> {
    let mut active: checkout_attempt::ActiveModel = attempt.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    active.update(txn).await?;
    Ok(())
}
