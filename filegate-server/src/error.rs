//! Error responses of the HTTP API.

use std::error::Error;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be bound: missing fields, wrong content type, or a malformed body.
    #[error("{0}")]
    Client(String),

    /// An error returned by the storage service.
    #[error(transparent)]
    Service(#[from] filegate_service::Error),

    /// A failure inside the gateway itself, such as spooling an upload to disk.
    #[error("{context}")]
    Server {
        /// What the gateway was doing.
        context: &'static str,
        /// The underlying cause.
        #[source]
        cause: Box<dyn Error + Send + Sync>,
    },
}

impl ApiError {
    /// Creates an [`ApiError::Server`] from a context message and its cause.
    pub fn server<E>(context: &'static str, cause: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Server {
            context,
            cause: cause.into(),
        }
    }

    /// The HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        use filegate_service::Error as E;

        match self {
            ApiError::Client(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(E::InvalidArgument(_) | E::InvalidPath { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Service(E::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Service(E::BackendUnavailable { .. }) | ApiError::Server { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A JSON error response returned by the API.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = &self as &dyn Error, "error handling request");
        } else {
            tracing::debug!(error = &self as &dyn Error, %status, "request rejected");
        }

        let body = ApiErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use filegate_service::Error as ServiceError;

    use super::*;

    #[test]
    fn maps_service_errors_to_status() {
        let cases = [
            (
                ApiError::from(ServiceError::InvalidArgument("empty".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(ServiceError::InvalidPath {
                    path: "../x".into(),
                    reason: "relative segment",
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(ServiceError::NotFound("object `a`".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(ServiceError::unavailable("timed out", "elapsed")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Client("missing field".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error:?}");
        }
    }

    #[tokio::test]
    async fn renders_json_body() {
        let response = ApiError::from(ServiceError::NotFound("object `a/b`".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"error": "not found: object `a/b`"}));
    }
}
