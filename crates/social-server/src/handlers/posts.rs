//! Post and comment routes.
//!
//! Handlers take [`BearerAuth`] before [`LoadedPost`], so a missing post is
//! reported only to authenticated callers, and ownership is checked after
//! the post is loaded.

use axum::{
    Json,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
};
use serde::Deserialize;
use social_auth::BearerAuth;
use social_storage::{Comment, NewComment, NewPost, Post, PostId, PostPatch};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Role a non-owner needs to edit a post.
pub const EDIT_ROLE: &str = "moderator";

/// Role a non-owner needs to delete a post.
pub const DELETE_ROLE: &str = "admin";

/// The post addressed by the `{id}` path segment.
pub struct LoadedPost(pub Post);

impl FromRequestParts<AppState> for LoadedPost {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<PostId>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let post = state
            .gate
            .bounded("post_load", state.posts.find_by_id(id))
            .await??
            .ok_or_else(|| ApiError::NotFound("post".to_string()))?;
        Ok(LoadedPost(post))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// `POST /v1/posts`
pub async fn create_post(
    State(state): State<AppState>,
    BearerAuth(identity): BearerAuth,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let post = state
        .posts
        .create(NewPost {
            owner_id: identity.user_id(),
            title: request.title,
            content: request.content,
            tags: request.tags,
        })
        .await?;
    tracing::debug!(post_id = post.id, owner_id = post.owner_id, "Post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// `GET /v1/posts/{id}`
pub async fn get_post(_: BearerAuth, LoadedPost(post): LoadedPost) -> Json<Post> {
    Json(post)
}

/// `PATCH /v1/posts/{id}`
pub async fn update_post(
    State(state): State<AppState>,
    BearerAuth(identity): BearerAuth,
    LoadedPost(post): LoadedPost,
    Json(patch): Json<PostPatch>,
) -> ApiResult<Json<Post>> {
    state
        .gate
        .authorize_ownership(&identity, post.owner_id, EDIT_ROLE)
        .await?;

    if patch.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one of title or content is required".to_string(),
        ));
    }

    let updated = state.posts.update(post.id, post.version, patch).await?;
    tracing::debug!(
        post_id = updated.id,
        user_id = identity.user_id(),
        version = updated.version,
        "Post updated"
    );
    Ok(Json(updated))
}

/// `DELETE /v1/posts/{id}`
pub async fn delete_post(
    State(state): State<AppState>,
    BearerAuth(identity): BearerAuth,
    LoadedPost(post): LoadedPost,
) -> ApiResult<StatusCode> {
    state
        .gate
        .authorize_ownership(&identity, post.owner_id, DELETE_ROLE)
        .await?;

    state.posts.delete(post.id).await?;
    tracing::info!(post_id = post.id, user_id = identity.user_id(), "Post deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/posts/{id}/comments`
pub async fn create_comment(
    State(state): State<AppState>,
    BearerAuth(identity): BearerAuth,
    LoadedPost(post): LoadedPost,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .comments
        .create(NewComment {
            post_id: post.id,
            user_id: identity.user_id(),
            content: request.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
