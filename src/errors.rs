use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Structured error payload returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Per-product shortfall details, present only for stock shortages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortages: Option<Vec<ShortageLine>>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// One product whose requested quantity exceeds the available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShortageLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub requested: i32,
    /// Maximum quantity that could still be satisfied
    pub available: i32,
}

/// Accumulated stock shortfalls across the lines of a cart or order.
///
/// Never silently clamps: every offending product is enumerated so the
/// buyer can adjust their cart in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StockShortage {
    pub lines: Vec<ShortageLine>,
}

impl StockShortage {
    pub fn push(&mut self, line: ShortageLine) {
        self.lines.push(line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl std::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for line in &self.lines {
            if !first {
                write!(f, "; ")?;
            }
            write!(
                f,
                "{}: requested {}, available {}",
                line.product_name, line.requested, line.available
            )?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient stock: {0}")]
    StockShortage(StockShortage),

    #[error("Payment intent creation failed: {0}")]
    IntentCreationFailed(String),

    #[error("Payment callback signature verification failed")]
    SignatureMismatch,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::StockShortage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::IntentCreationFailed(_) => StatusCode::BAD_GATEWAY,
            Self::SignatureMismatch => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.response_message();
        let shortages = match &self {
            Self::StockShortage(shortage) => Some(shortage.lines.clone()),
            _ => None,
        };

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            shortages,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
