use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{checkout_attempt, order::OrderStatus, CheckoutAttempt},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        assembler,
        cart::CartStore,
        gateway::{to_minor_units, PaymentGateway},
        status::OrderStateMachine,
    },
};

/// Buyer-supplied contact and delivery details for one checkout.
#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub customer_name: String,
    pub customer_email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
}

/// What the buyer needs to pay: the gateway order id to reference and the
/// exact amount the gateway was told to charge.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
}

/// Drives a checkout attempt up to the point where the buyer pays
/// externally: snapshot, quote, gateway intent, persisted attempt.
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    carts: Arc<CartStore>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: Arc<CartStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        currency: String,
    ) -> Self {
        Self {
            db,
            carts,
            gateway,
            event_sender,
            currency,
        }
    }

    /// Starts a checkout attempt for the session's cart.
    ///
    /// Quotes the cart, registers a payment intent with the gateway, and
    /// persists the attempt in `PendingPayment` holding the priced lines, so
    /// the later commit charges exactly what was quoted. The cart is left
    /// intact until the commit succeeds. Gateway failure after bounded
    /// retries surfaces with no side effects.
    #[instrument(skip(self, input))]
    pub async fn begin(
        &self,
        session_id: &str,
        input: CheckoutInput,
    ) -> Result<CheckoutReceipt, ServiceError> {
        let snapshot = self.carts.snapshot(session_id).await?;
        let intent = assembler::quote(&snapshot, &self.currency)?;
        let amount_minor = to_minor_units(intent.total)?;

        let gateway_order_id = self
            .gateway
            .create_intent(amount_minor, &self.currency)
            .await?;

        let lines = serde_json::to_value(&intent.lines)
            .map_err(|e| ServiceError::InternalError(format!("serializing quote lines: {}", e)))?;

        let now = Utc::now();
        checkout_attempt::ActiveModel {
            id: Set(Uuid::new_v4()),
            gateway_order_id: Set(gateway_order_id.clone()),
            session_id: Set(session_id.to_string()),
            customer_name: Set(input.customer_name),
            customer_email: Set(input.customer_email),
            phone: Set(input.phone),
            address: Set(input.address),
            city: Set(input.city),
            postal_code: Set(input.postal_code),
            currency: Set(intent.currency.clone()),
            total_amount: Set(intent.total),
            lines: Set(lines),
            status: Set(OrderStatus::PendingPayment),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(%session_id, %gateway_order_id, amount = %intent.total, "checkout started");
        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                session_id: session_id.to_string(),
                gateway_order_id: gateway_order_id.clone(),
            })
            .await;

        Ok(CheckoutReceipt {
            gateway_order_id,
            amount: intent.total,
            amount_minor,
            currency: intent.currency,
        })
    }

    /// Marks an attempt as failed after a rejected callback. Only a
    /// `PendingPayment` attempt can fail; anything else is left untouched.
    #[instrument(skip(self))]
    pub async fn mark_payment_failed(&self, gateway_order_id: &str) -> Result<(), ServiceError> {
        let attempt = CheckoutAttempt::find()
            .filter(checkout_attempt::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?;

        let Some(attempt) = attempt else {
            warn!(%gateway_order_id, "rejected callback for unknown gateway order");
            return Ok(());
        };

        if !OrderStateMachine::can_transition(attempt.status, OrderStatus::PaymentFailed) {
            return Ok(());
        }

        let mut active: checkout_attempt::ActiveModel = attempt.into();
        active.status = Set(OrderStatus::PaymentFailed);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }
}
