use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::message::Message;
use crate::routes::extractors::AuthenticatedUser;

/// GET /api/messages/:counterpart_id
///
/// The ordered conversation snapshot between the caller and the counterpart.
/// This read is the authoritative recovery path for clients whose live
/// connection dropped.
pub async fn get_conversation(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(counterpart_id): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    let counterpart = Uuid::parse_str(&counterpart_id)
        .map_err(|_| AppError::invalid_request("invalid counterpart id"))?;

    let messages = ctx.store.list_conversation(user_id, counterpart).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub text: String,
}

/// POST /api/messages
///
/// The durable send path. Persists the message, fans it out to both parties'
/// live connections, and returns the persisted record so the caller can
/// reconcile its optimistic entry.
pub async fn send_message(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<impl IntoResponse> {
    let message = ctx.delivery.send(user_id, &req.receiver_id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
