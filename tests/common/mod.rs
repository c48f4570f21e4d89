use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use gadget_commerce_api::{
    app_router,
    config::AppConfig,
    db,
    entities::product,
    errors::ServiceError,
    events::{self, EventSender},
    services::gateway::PaymentGateway,
    AppState,
};

pub const WEBHOOK_SECRET: &str = "test_webhook_secret_32_chars_long";

/// Deterministic in-process gateway: hands out sequential order ids and
/// never fails.
#[derive(Default)]
pub struct StaticGateway {
    counter: AtomicU64,
}

#[async_trait]
impl PaymentGateway for StaticGateway {
    async fn create_intent(
        &self,
        _amount_minor: i64,
        _currency: &str,
    ) -> Result<String, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("gw_order_{}", n))
    }
}

/// Test harness over a file-backed SQLite database in a temp directory.
pub struct TestApp {
    pub state: Arc<AppState>,
    router: Router,
    _tmp: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(StaticGateway::default())).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let db_path = tmp.path().join("commerce_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "http://gateway.invalid".to_string(),
            WEBHOOK_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One pooled connection so concurrent commits serialize on SQLite.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("migrations");

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = Arc::new(AppState::build(
            Arc::new(pool),
            cfg,
            event_sender,
            gateway,
        ));
        let router = app_router(state.clone());

        Self {
            state,
            router,
            _tmp: tmp,
            _event_task: event_task,
        }
    }

    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        discount_percentage: Decimal,
        stock: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            slug: Set(name.to_lowercase().replace(' ', "-")),
            price: Set(price),
            discount_amount: Set(Decimal::ZERO),
            discount_percentage: Set(discount_percentage),
            stock: Set(stock),
            available: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product");
        id
    }

    /// Sends a JSON request and parses the JSON response (Null when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, raw) = self.request_raw(method, uri, headers, body).await;
        let value = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&raw).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Sends a request and returns the raw response body.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("read body");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }
}
