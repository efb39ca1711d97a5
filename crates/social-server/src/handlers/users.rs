//! User profile and follow routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use social_auth::BearerAuth;
use social_storage::{User, UserId};
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Role a user needs to delete another account.
pub const DELETE_ROLE: &str = "admin";

/// Public view of a user.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: String,
    pub role_level: i32,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.name,
            role_level: user.role.level,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// `GET /v1/users/{id}`, served through the user cache.
pub async fn get_user(
    State(state): State<AppState>,
    _: BearerAuth,
    Path(id): Path<UserId>,
) -> ApiResult<Json<UserResponse>> {
    // The cache bounds its own store read.
    let user = state.gate.users().resolve(id).await?;
    Ok(Json(user.into()))
}

/// `PUT /v1/users/{id}/follow`
pub async fn follow_user(
    State(state): State<AppState>,
    BearerAuth(identity): BearerAuth,
    Path(id): Path<UserId>,
) -> ApiResult<StatusCode> {
    if id == identity.user_id() {
        return Err(ApiError::BadRequest("users cannot follow themselves".to_string()));
    }
    state.followers.follow(identity.user_id(), id).await?;
    tracing::debug!(follower = identity.user_id(), followed = id, "User followed");
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /v1/users/{id}/unfollow`
pub async fn unfollow_user(
    State(state): State<AppState>,
    BearerAuth(identity): BearerAuth,
    Path(id): Path<UserId>,
) -> ApiResult<StatusCode> {
    state.followers.unfollow(identity.user_id(), id).await?;
    tracing::debug!(follower = identity.user_id(), followed = id, "User unfollowed");
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /v1/users/{id}`
///
/// Users may delete themselves; deleting someone else takes the admin role.
/// The cached snapshot is dropped so the deleted user's tokens stop working.
pub async fn delete_user(
    State(state): State<AppState>,
    BearerAuth(identity): BearerAuth,
    Path(id): Path<UserId>,
) -> ApiResult<StatusCode> {
    state
        .gate
        .authorize_ownership(&identity, id, DELETE_ROLE)
        .await?;

    state.gate.bounded("user_delete", state.users.delete(id)).await??;
    state.gate.users().invalidate(id).await;
    tracing::info!(user_id = id, deleted_by = identity.user_id(), "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
