use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};

/// Extractor for the authenticated user id from the `Authorization` header.
///
/// Usage:
/// ```ignore
/// async fn handler(AuthenticatedUser(user_id): AuthenticatedUser) -> ... {}
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Uuid);

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = extract_identity(state, parts).map_err(|e| {
            tracing::warn!(error = %e, "request authentication failed");
            e.into_response()
        })?;
        Ok(AuthenticatedUser(user_id))
    }
}

fn extract_identity(ctx: &AppContext, parts: &Parts) -> AppResult<Uuid> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthenticated("missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthenticated("invalid Authorization header format"))?;

    ctx.auth_manager.verify_identity(token)
}
