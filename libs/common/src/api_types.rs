//! JSON envelopes returned by stockwatch HTTP endpoints
//!
//! Every JSON endpoint answers with either a [`SuccessResponse`] or an
//! [`ErrorResponse`] envelope.

use errors::{ErrorInfo, StockwatchError};
use serde::{Deserialize, Serialize};

fn bool_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    #[serde(default = "bool_true")]
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// `{"success": false, "error": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub success: bool,
    pub error: ErrorInfo,
}

/// Liveness payload for `/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthStatus {
    pub fn healthy(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.into(),
            version: version.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Handler error rendered as an [`ErrorResponse`] with its HTTP status
#[cfg(feature = "axum")]
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ErrorInfo,
}

#[cfg(feature = "axum")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: self.error,
            }),
        )
            .into_response()
    }
}

#[cfg(feature = "axum")]
impl From<StockwatchError> for AppError {
    fn from(err: StockwatchError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            error: err.to_error_info(),
        }
    }
}

/// One page of a listing; `page` counts from 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    #[serde(rename = "list", alias = "items")]
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_next: bool,
}

impl<T> PaginatedResponse<T> {
    /// Cut page `page` out of `all`. Page size is clamped to 1..=100.
    pub fn from_slice(all: Vec<T>, page: usize, page_size: usize) -> Self {
        let total = all.len();
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        Self {
            items: all.into_iter().skip(offset).take(page_size).collect(),
            total,
            page,
            page_size,
            has_next: offset + page_size < total,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_success_response_serialization() {
        let resp = SuccessResponse::new(serde_json::json!({"deviceId": "d-1"}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["deviceId"], "d-1");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_pagination_from_slice() {
        let page = PaginatedResponse::from_slice((0..25).collect::<Vec<_>>(), 2, 10);
        assert_eq!(page.items, (10..20).collect::<Vec<_>>());
        assert_eq!(page.total, 25);
        assert!(page.has_next);

        let last = PaginatedResponse::from_slice((0..25).collect::<Vec<_>>(), 3, 10);
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_next);
    }

    #[cfg(feature = "axum")]
    #[test]
    fn test_app_error_from_stockwatch_error() {
        let err: AppError = StockwatchError::RateLimitExceeded.into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error.code, 429);

        let err: AppError = StockwatchError::DeviceNotFound("d-9".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
