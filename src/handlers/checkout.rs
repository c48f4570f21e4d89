use axum::{
    extract::{Path, State},
    response::Response,
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, validate_input},
    services::checkout::CheckoutInput,
    AppState,
};

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new().route("/{session_id}", post(begin_checkout))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
}

/// Start a checkout attempt for the session's cart
#[utoipa::path(
    post,
    path = "/checkout/{session_id}",
    request_body = CheckoutRequest,
    responses(
        (status = 201, body = CheckoutResponse),
        (status = 400, description = "Empty cart or malformed contact details"),
        (status = 422, description = "Requested quantity exceeds stock"),
        (status = 502, description = "Payment gateway unreachable")
    )
)]
pub async fn begin_checkout(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let receipt = state
        .checkout
        .begin(
            &session_id,
            CheckoutInput {
                customer_name: payload.customer_name,
                customer_email: payload.customer_email,
                phone: payload.phone,
                address: payload.address,
                city: payload.city,
                postal_code: payload.postal_code,
            },
        )
        .await?;

    Ok(created_response(CheckoutResponse {
        gateway_order_id: receipt.gateway_order_id,
        amount: receipt.amount,
        amount_minor: receipt.amount_minor,
        currency: receipt.currency,
    }))
}
