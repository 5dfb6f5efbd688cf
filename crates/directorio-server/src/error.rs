use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use directorio_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Missing or invalid access token")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Logo not found: {0}")]
    LogoNotFound(String),

    #[error("Logo too large: {size} bytes (max {max})")]
    LogoTooLarge { size: usize, max: usize },

    #[error("Logo storage error: {0}")]
    LogoStorage(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::LogoNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::LogoTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ServerError::LogoStorage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Logo storage error".to_string(),
            ),
            ServerError::Store(store) => match store {
                StoreError::Validation(_) => (StatusCode::BAD_REQUEST, store.to_string()),
                StoreError::NotFound => (StatusCode::NOT_FOUND, store.to_string()),
                StoreError::PermissionDenied(_) => (StatusCode::FORBIDDEN, store.to_string()),
                _ => {
                    tracing::error!(error = %store, "store failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Database error".to_string(),
                    )
                }
            },
            ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
