//! Maps every failure this service can produce onto the HTTP status codes and bodies
//! `/v0/entity` promises, in one place, the way `control-plane-api`'s `ApiError` does it:
//! as a single `IntoResponse` impl rather than a separate middleware layer.

use crate::coordinator::CoordinatorError;
use crate::http::query::X_LAST_MODIFIED;
use crate::record::format_timestamp;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad parameters: {0}")]
    BadParameters(String),

    #[error("not found")]
    NotFound {
        tombstone_at: Option<chrono::DateTime<chrono::Utc>>,
    },

    #[error("not enough replicas: {observed}/{required}")]
    NotEnoughReplicas { required: usize, observed: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    errors: Vec<String>,
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::BadParameters(msg) => ApiError::BadParameters(msg),
            CoordinatorError::NotFound { tombstone_at } => ApiError::NotFound { tombstone_at },
            CoordinatorError::NotEnoughReplicas { required, observed } => {
                ApiError::NotEnoughReplicas { required, observed }
            }
            CoordinatorError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound { tombstone_at: None },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadParameters(msg) => {
                tracing::warn!(message = %msg, "rejecting malformed request");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorBody {
                        detail: "bad request".into(),
                        errors: vec![msg],
                    }),
                )
                    .into_response()
            }
            ApiError::NotFound { tombstone_at } => {
                let mut response = StatusCode::NOT_FOUND.into_response();
                if let Some(ts) = tombstone_at {
                    if let Ok(value) = format_timestamp(ts).parse() {
                        response.headers_mut().insert(X_LAST_MODIFIED, value);
                    }
                }
                response
            }
            ApiError::NotEnoughReplicas { required, observed } => {
                tracing::warn!(required, observed, "quorum not reached");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    Json(ErrorBody {
                        detail: "not enough replicas responded".into(),
                        errors: vec![format!("{observed} of {required} required replicas responded")],
                    }),
                )
                    .into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        detail: "internal error".into(),
                        errors: vec![msg],
                    }),
                )
                    .into_response()
            }
        }
    }
}

/// Fallback handler for unmatched routes. A bare axum 404 here would be indistinguishable
/// from a real "key not found" response; rewriting it to 400 keeps 404 meaning exactly
/// one thing: "no record at this key".
pub async fn not_found_fallback() -> ApiError {
    ApiError::BadParameters("no such route".into())
}
