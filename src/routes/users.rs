use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::context::AppContext;
use crate::db::{self, PublicUser};
use crate::error::{AppError, AppResult};
use crate::routes::extractors::AuthenticatedUser;

/// GET /api/users
///
/// All users except the caller, for picking a conversation counterpart.
pub async fn list_users(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<Json<Vec<PublicUser>>> {
    let users = db::list_users_except(&ctx.db_pool, &user_id)
        .await
        .map_err(AppError::from)?;
    Ok(Json(users))
}
