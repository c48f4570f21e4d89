use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::errors::ServiceError;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate()?;
    Ok(())
}

/// Staff identity asserted by the upstream proxy via `X-Staff-Role`.
/// Authentication itself happens at the edge; this only gates staff-facing
/// endpoints inside the core.
pub fn require_staff(headers: &HeaderMap) -> Result<(), ServiceError> {
    match headers.get("x-staff-role").and_then(|v| v.to_str().ok()) {
        Some(role) if !role.is_empty() => Ok(()),
        _ => Err(ServiceError::Forbidden(
            "staff role required".to_string(),
        )),
    }
}

/// Customer identity asserted by the upstream proxy via `X-Customer-Email`.
pub fn customer_email(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-customer-email")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
