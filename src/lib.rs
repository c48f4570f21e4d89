pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod openapi;
pub mod services;

use axum::{response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use services::{
    cart::CartStore, checkout::CheckoutService, export::OrderExporter, gateway::PaymentGateway,
    ledger::StockLedger, status::OrderStatusService,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub carts: Arc<CartStore>,
    pub checkout: Arc<CheckoutService>,
    pub ledger: Arc<StockLedger>,
    pub order_status: Arc<OrderStatusService>,
    pub exporter: Arc<OrderExporter>,
}

impl AppState {
    /// Wires the service graph over one database connection and event
    /// channel. The gateway is injected so tests can substitute their own.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let carts = Arc::new(CartStore::new(db.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            carts.clone(),
            gateway,
            event_sender.clone(),
            config.currency.clone(),
        ));
        let ledger = Arc::new(StockLedger::new(
            db.clone(),
            event_sender.clone(),
            carts.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(db.clone(), event_sender.clone()));
        let exporter = Arc::new(OrderExporter::new(db.clone()));

        Self {
            db,
            config,
            event_sender,
            carts,
            checkout,
            ledger,
            order_status,
            exporter,
        }
    }
}

/// All v1 API routes, nested under `/api/v1`.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/carts", handlers::carts_routes())
        .nest("/checkout", handlers::checkout_routes())
        .nest("/payments", handlers::payments_routes())
        .nest("/orders", handlers::orders_routes())
}

async fn status_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Json<Value> {
    let db_ok = state.db.ping().await.is_ok();
    Json(json!({
        "status": if db_ok { "healthy" } else { "degraded" },
        "database": if db_ok { "up" } else { "down" },
    }))
}

async fn openapi_json() -> Json<Value> {
    Json(json!(openapi::ApiDoc::openapi()))
}

/// Builds the complete application router.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/openapi.json", get(openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
