use axum::{extract::State, response::Response, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::Event,
    handlers::common::success_response,
    services::signature,
    AppState,
};

/// Creates the router for payment gateway callbacks
pub fn payments_routes() -> Router<Arc<AppState>> {
    Router::new().route("/callback", post(payment_callback))
}

/// Inbound gateway callback. May be delivered more than once for the same
/// payment. The buyer-supplied contact fields are ignored; the persisted
/// checkout attempt is authoritative.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentCallback {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentCallbackResponse {
    pub status: String,
    pub order_id: Uuid,
}

/// Confirm a payment and commit the order
#[utoipa::path(
    post,
    path = "/payments/callback",
    request_body = PaymentCallback,
    responses(
        (status = 200, body = PaymentCallbackResponse),
        (status = 401, description = "Signature verification failed"),
        (status = 422, description = "Stock ran out between quote and payment")
    )
)]
pub async fn payment_callback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PaymentCallback>,
) -> Result<Response, ServiceError> {
    let verified = signature::verify(
        &payload.gateway_order_id,
        &payload.gateway_payment_id,
        &payload.signature,
        &state.config.gateway_webhook_secret,
    );

    if !verified {
        warn!(
            gateway_order_id = %payload.gateway_order_id,
            "payment callback failed signature verification"
        );
        state
            .event_sender
            .send_or_log(Event::PaymentRejected {
                gateway_order_id: payload.gateway_order_id.clone(),
            })
            .await;
        // Best effort; the rejection stands regardless.
        if let Err(e) = state
            .checkout
            .mark_payment_failed(&payload.gateway_order_id)
            .await
        {
            warn!(error = %e, "could not mark attempt as failed");
        }
        return Err(ServiceError::SignatureMismatch);
    }

    let outcome = state
        .ledger
        .commit(&payload.gateway_order_id, &payload.gateway_payment_id)
        .await?;

    Ok(success_response(PaymentCallbackResponse {
        status: "success".to_string(),
        order_id: outcome.order().id,
    }))
}
