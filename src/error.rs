//! HTTP-facing error type.
//!
//! Every handler returns `Result<_, ApiError>`. Responses use one envelope:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "content item 7 not found" } }
//! ```
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | `Validation` | 400 | `bad_request` |
//! | `EmbeddingsDisabled` | 400 | `embeddings_disabled` |
//! | `Unauthorized` | 401 | `unauthorized` |
//! | `Forbidden` | 403 | `forbidden` |
//! | `NotFound` | 404 | `not_found` |
//! | `Upstream` | 500 | `upstream_error` |
//! | `Internal` | 500 | `internal` |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::analyzer::AnalysisError;
use crate::chat::ChatError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    EmbeddingsDisabled(String),
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::EmbeddingsDisabled(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "bad_request",
            ApiError::EmbeddingsDisabled(_) => "embeddings_disabled",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(e) => {
                tracing::error!(error = %format!("{:#}", e), "internal error");
                "internal server error".to_string()
            }
            ApiError::Upstream(msg) => {
                tracing::error!(error = %msg, "upstream failure");
                msg.clone()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::ContentNotFound(_) => ApiError::NotFound(e.to_string()),
            ChatError::Analysis(inner) => inner.into(),
            ChatError::Store(inner) => ApiError::Internal(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_statuses() {
        let err: ApiError = ChatError::ContentNotFound(3).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "content item 3 not found");

        let err: ApiError = ChatError::Store(anyhow::anyhow!("disk full")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn embeddings_disabled_is_a_client_error() {
        let err = ApiError::EmbeddingsDisabled("no index".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "embeddings_disabled");
    }
}
