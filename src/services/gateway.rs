use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

use crate::errors::ServiceError;

/// Creates payment intents with the external gateway.
///
/// Behind a trait so tests can substitute a deterministic gateway without
/// standing up an HTTP server.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers an intent to charge `amount_minor` (minor units) and returns
    /// the gateway's order id, the key every later callback references.
    async fn create_intent(&self, amount_minor: i64, currency: &str)
        -> Result<String, ServiceError>;
}

/// Retry policy for intent creation. Delays grow geometrically and are capped.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        Duration::from_millis(delay as u64).min(self.max_delay)
    }
}

#[derive(Debug, Serialize)]
struct CreateIntentRequest<'a> {
    amount: i64,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateIntentResponse {
    gateway_order_id: String,
}

/// HTTP client for the real payment gateway.
///
/// Transport failures, 5xx and 429 responses are retried with backoff; other
/// 4xx responses fail immediately since retrying a rejected request cannot
/// succeed. Exhausted retries surface as [`ServiceError::IntentCreationFailed`]
/// so no money moves and no order appears.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, retry: RetryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            retry,
        }
    }

    async fn try_create(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<Result<String, String>, String> {
        let mut request = self
            .client
            .post(format!("{}/intents", self.base_url))
            .json(&CreateIntentRequest {
                amount: amount_minor,
                currency,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();

        if status.is_success() {
            let body: CreateIntentResponse =
                response.json().await.map_err(|e| e.to_string())?;
            return Ok(Ok(body.gateway_order_id));
        }

        let retryable = status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
        if retryable {
            Err(format!("gateway returned {}", status))
        } else {
            Ok(Err(format!("gateway rejected intent: {}", status)))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<String, ServiceError> {
        let mut last_error = String::new();

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_for_attempt(attempt - 1)).await;
            }

            match self.try_create(amount_minor, currency).await {
                Ok(Ok(gateway_order_id)) => return Ok(gateway_order_id),
                Ok(Err(rejection)) => {
                    return Err(ServiceError::IntentCreationFailed(rejection));
                }
                Err(transient) => {
                    warn!(attempt = attempt + 1, error = %transient, "intent creation failed");
                    last_error = transient;
                }
            }
        }

        Err(ServiceError::IntentCreationFailed(format!(
            "gave up after {} attempts: {}",
            self.retry.max_attempts, last_error
        )))
    }
}

/// Converts a two-decimal major amount into integral minor units (paise).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|v| v.to_i64())
        .ok_or_else(|| ServiceError::InternalError(format!("amount {} out of range", amount)))
}
