//! Unified error handling for the API.
//!
//! Every error response is JSON: `{"error": <code>, "message": <text>}`, plus
//! `available` / `requested` for insufficient stock.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use garage_core::EmployeeId;

use crate::services::InventoryError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Inventory operation failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Missing or invalid bearer token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the role is not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed request (bad JSON, bad path or query parameter).
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Inventory(InventoryError::Validation(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Inventory(InventoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Inventory(InventoryError::InsufficientStock { .. }) => StatusCode::CONFLICT,
            Self::Inventory(InventoryError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Inventory(InventoryError::Validation(_)) | Self::BadRequest(_) => {
                "validation_error"
            }
            Self::Inventory(InventoryError::NotFound(_)) => "not_found",
            Self::Inventory(InventoryError::InsufficientStock { .. }) => "insufficient_stock",
            Self::Inventory(InventoryError::Persistence(_)) => "persistence_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request failed"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Inventory(InventoryError::Persistence(_)) => "Internal server error".to_string(),
            Self::Inventory(err) => err.to_string(),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg) => msg.clone(),
        };

        let body = match &self {
            Self::Inventory(InventoryError::InsufficientStock {
                available,
                requested,
                ..
            }) => json!({
                "error": self.code(),
                "message": message,
                "available": available,
                "requested": requested,
            }),
            _ => json!({
                "error": self.code(),
                "message": message,
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Set the Sentry user context from the authenticated employee.
pub fn set_sentry_user(employee_id: EmployeeId, name: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(employee_id.to_string()),
            username: Some(name.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::RepositoryError;
    use garage_core::InventoryItemId;
    use http_body_util::BodyExt;
    use rust_decimal::Decimal;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");

        let err = AppError::from(InventoryError::NotFound("inventory item 3".to_string()));
        assert_eq!(err.to_string(), "inventory item 3 not found");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(InventoryError::Validation("bad".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(InventoryError::NotFound("x".to_string()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(
                InventoryError::InsufficientStock {
                    item_id: InventoryItemId::new(1),
                    available: Decimal::from(20),
                    requested: Decimal::from(25),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                InventoryError::Persistence(RepositoryError::Unavailable("down".to_string()))
                    .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Unauthorized("no token".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("role".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::BadRequest("json".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_insufficient_stock_body_carries_quantities() {
        let response = AppError::from(InventoryError::InsufficientStock {
            item_id: InventoryItemId::new(1),
            available: Decimal::from(20),
            requested: Decimal::from(25),
        })
        .into_response();

        let body = body_json(response).await;
        assert_eq!(body["error"], "insufficient_stock");
        assert_eq!(body["available"], "20");
        assert_eq!(body["requested"], "25");
    }

    #[tokio::test]
    async fn test_persistence_error_hides_details() {
        let response = AppError::from(InventoryError::Persistence(
            RepositoryError::DataCorruption("transaction_type 'sideways'".to_string()),
        ))
        .into_response();

        let body = body_json(response).await;
        assert_eq!(body["error"], "persistence_error");
        assert_eq!(body["message"], "Internal server error");
    }
}
