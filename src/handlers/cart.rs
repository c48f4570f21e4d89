use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    events::Event,
    handlers::common::{no_content_response, success_response, validate_input},
    services::pricing,
    AppState,
};

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{session_id}", get(get_cart))
        .route("/{session_id}/items", post(add_item))
        .route("/{session_id}/items/{product_id}", put(update_item).delete(remove_item))
        .route("/{session_id}/clear", post(clear_cart))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateItemRequest {
    /// Zero removes the line.
    #[validate(range(min = 0))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub in_stock: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub session_id: String,
    pub lines: Vec<CartLineView>,
    pub total: Decimal,
}

/// View the cart with live prices
#[utoipa::path(
    get,
    path = "/carts/{session_id}",
    params(("session_id" = String, Path, description = "Cart session id")),
    responses((status = 200, body = CartView))
)]
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response, ServiceError> {
    let view = render_cart(&state, &session_id).await?;
    Ok(success_response(view))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/carts/{session_id}/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, body = CartView),
        (status = 422, description = "Requested quantity exceeds stock")
    )
)]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<AddItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    state
        .carts
        .add(&session_id, payload.product_id, payload.quantity)
        .await?;
    state
        .event_sender
        .send_or_log(Event::CartUpdated {
            session_id: session_id.clone(),
        })
        .await;

    let view = render_cart(&state, &session_id).await?;
    Ok(success_response(view))
}

/// Set a line's quantity
#[utoipa::path(
    put,
    path = "/carts/{session_id}/items/{product_id}",
    request_body = UpdateItemRequest,
    responses((status = 200, body = CartView))
)]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((session_id, product_id)): Path<(String, Uuid)>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    state
        .carts
        .set_quantity(&session_id, product_id, payload.quantity)
        .await?;
    state
        .event_sender
        .send_or_log(Event::CartUpdated {
            session_id: session_id.clone(),
        })
        .await;

    let view = render_cart(&state, &session_id).await?;
    Ok(success_response(view))
}

/// Remove a line
#[utoipa::path(
    delete,
    path = "/carts/{session_id}/items/{product_id}",
    responses((status = 204))
)]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((session_id, product_id)): Path<(String, Uuid)>,
) -> Result<Response, ServiceError> {
    state.carts.remove(&session_id, product_id);
    state
        .event_sender
        .send_or_log(Event::CartUpdated { session_id })
        .await;
    Ok(no_content_response())
}

/// Destroy the cart
#[utoipa::path(
    post,
    path = "/carts/{session_id}/clear",
    responses((status = 204))
)]
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response, ServiceError> {
    state.carts.clear(&session_id);
    state
        .event_sender
        .send_or_log(Event::CartUpdated { session_id })
        .await;
    Ok(no_content_response())
}

async fn render_cart(state: &AppState, session_id: &str) -> Result<CartView, ServiceError> {
    let snapshot = state.carts.snapshot(session_id).await?;

    let mut lines = Vec::with_capacity(snapshot.len());
    let mut total = Decimal::ZERO;
    for (product, quantity) in &snapshot {
        let unit_price = pricing::resolve_unit_price(product);
        let line_total = unit_price * Decimal::from(*quantity);
        total += line_total;
        lines.push(CartLineView {
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price,
            quantity: *quantity,
            line_total,
            in_stock: *quantity <= product.stock,
        });
    }

    Ok(CartView {
        session_id: session_id.to_string(),
        lines,
        total,
    })
}
