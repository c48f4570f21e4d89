use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{order, order::OrderStatus, order_item, Order, OrderItem},
    errors::ServiceError,
    handlers::common::{customer_email, require_staff, success_response, validate_input},
    AppState,
};

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{id}", get(get_order))
        .route("/status", post(bulk_update_status))
        .route("/export", get(export_orders))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BulkStatusRequest {
    #[validate(length(min = 1))]
    pub order_ids: Vec<Uuid>,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkStatusResponse {
    pub updated: u64,
}

/// Fetch one order with its lines
///
/// Staff (`X-Staff-Role`) may read any order; otherwise the caller's
/// `X-Customer-Email` must match the order's customer.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, body = OrderView),
        (status = 403, description = "Order belongs to another customer"),
        (status = 404, description = "No such order")
    )
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = Order::find_by_id(id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

    if require_staff(&headers).is_err() {
        let email = customer_email(&headers).ok_or_else(|| {
            ServiceError::Forbidden("customer identity required".to_string())
        })?;
        if !email.eq_ignore_ascii_case(&order.customer_email) {
            return Err(ServiceError::Forbidden(
                "order belongs to another customer".to_string(),
            ));
        }
    }

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(&*state.db)
        .await?;

    Ok(success_response(OrderView { order, items }))
}

/// Bulk-advance order statuses (staff only)
///
/// Applies only forward-valid transitions; invalid ones are skipped and the
/// count of updated orders is returned.
#[utoipa::path(
    post,
    path = "/orders/status",
    request_body = BulkStatusRequest,
    responses(
        (status = 200, body = BulkStatusResponse),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn bulk_update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BulkStatusRequest>,
) -> Result<Response, ServiceError> {
    require_staff(&headers)?;
    validate_input(&payload)?;

    let updated = state
        .order_status
        .bulk_update_status(&payload.order_ids, payload.status)
        .await?;

    Ok(success_response(BulkStatusResponse { updated }))
}

/// Export all orders as CSV (staff only)
#[utoipa::path(
    get,
    path = "/orders/export",
    responses(
        (status = 200, content_type = "text/csv"),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn export_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    require_staff(&headers)?;

    let csv = state.exporter.orders_csv().await?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "text/csv")],
        csv,
    )
        .into_response())
}
