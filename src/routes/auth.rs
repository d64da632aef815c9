use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::context::AppContext;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// POST /api/auth/register
pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    if req.username.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::invalid_request("all fields are required"));
    }

    if db::get_user_by_email(&ctx.db_pool, &req.email)
        .await
        .map_err(AppError::from)?
        .is_some()
    {
        return Err(AppError::invalid_request("user already exists"));
    }

    let user = db::create_user(&ctx.db_pool, req.username.trim(), req.email.trim(), &req.password)
        .await
        .map_err(AppError::from)?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "user registered successfully" })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let user = db::get_user_by_email(&ctx.db_pool, &req.email)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::unauthenticated("invalid credentials"))?;

    if !db::verify_password(&user, &req.password)
        .await
        .unwrap_or(false)
    {
        return Err(AppError::unauthenticated("invalid credentials"));
    }

    let (token, _, expires_at) = ctx.auth_manager.create_token(&user.id)?;
    let (refresh_token, _, _) = ctx.auth_manager.create_refresh_token(&user.id)?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(json!({
        "token": token,
        "refreshToken": refresh_token,
        "expiresAt": expires_at,
        "user": user.public(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /api/auth/refresh
pub async fn refresh_token(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = ctx.auth_manager.verify_identity(&req.refresh_token)?;
    let (token, _, expires_at) = ctx.auth_manager.create_token(&user_id)?;

    Ok(Json(json!({
        "accessToken": token,
        "expiresAt": expires_at,
    })))
}

/// GET /api/auth/me
pub async fn me(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let user = db::get_user_by_id(&ctx.db_pool, &user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    Ok(Json(user.public()))
}
