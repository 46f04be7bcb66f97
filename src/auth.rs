//! Bearer-token authentication.
//!
//! Identity is owned by an external provider; the server only maps opaque
//! tokens from `[auth.tokens]` to a principal. Handlers that take an
//! [`AuthUser`] argument reject requests without a known token with 401.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use serde::Serialize;

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the principal for a request's headers.
pub fn authenticate(auth: &AuthConfig, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    let Some(token) = bearer_token(headers) else {
        tracing::debug!("missing Authorization header");
        return Err(ApiError::Unauthorized);
    };
    match auth.tokens.get(token) {
        Some(principal) => Ok(AuthUser {
            id: principal.user_id.clone(),
            name: principal.name.clone(),
        }),
        None => {
            tracing::warn!("unknown bearer token");
            Err(ApiError::Unauthorized)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(&state.ctx.config.auth, &parts.headers)
    }
}
