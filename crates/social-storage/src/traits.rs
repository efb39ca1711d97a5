//! Storage traits consumed by the gatekeeper and the HTTP handlers.
//!
//! Lookups return `Ok(None)` for a missing record; `Err` is reserved for
//! infrastructure failures. Mutations report a missing target as
//! [`StorageError::NotFound`].

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::types::{
    Comment, Invitation, NewComment, NewPost, NewUser, Post, PostId, PostPatch, Role, User,
    UserId,
};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence of user accounts.
///
/// # Example
///
/// ```ignore
/// use social_storage::{StorageError, UserStorage};
///
/// async fn load(storage: &dyn UserStorage, id: i64) -> Result<User, StorageError> {
///     storage
///         .find_by_id(id)
///         .await?
///         .ok_or_else(|| StorageError::not_found("user", id))
/// }
/// ```
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by ID.
    async fn find_by_id(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Finds a user by email address.
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// Creates a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the email or username is taken and
    /// `StorageError::NotFound` if the role does not exist.
    async fn create(&self, user: NewUser) -> StorageResult<User>;

    /// Deletes a user.
    async fn delete(&self, id: UserId) -> StorageResult<()>;
}

/// Pending account activations.
#[async_trait]
pub trait InvitationStorage: Send + Sync {
    /// Stores an invitation, replacing any earlier one for the same user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    async fn create_invitation(&self, invitation: Invitation) -> StorageResult<()>;

    /// Redeems the invitation whose token hashes to `token_hash`.
    ///
    /// The user is marked active and the invitation is consumed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no unexpired invitation matches.
    async fn activate(&self, token_hash: &str, now: OffsetDateTime) -> StorageResult<User>;
}

/// Lookup of the role table.
#[async_trait]
pub trait RoleStorage: Send + Sync {
    /// Finds a role by name.
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Role>>;
}

/// Persistence of posts.
#[async_trait]
pub trait PostStorage: Send + Sync {
    async fn create(&self, post: NewPost) -> StorageResult<Post>;

    async fn find_by_id(&self, id: PostId) -> StorageResult<Option<Post>>;

    /// Applies `patch` if the stored version still equals `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the post changed in between.
    async fn update(
        &self,
        id: PostId,
        expected_version: i64,
        patch: PostPatch,
    ) -> StorageResult<Post>;

    async fn delete(&self, id: PostId) -> StorageResult<()>;
}

/// Persistence of comments.
#[async_trait]
pub trait CommentStorage: Send + Sync {
    async fn create(&self, comment: NewComment) -> StorageResult<Comment>;
}

/// Follow edges between users.
#[async_trait]
pub trait FollowerStorage: Send + Sync {
    /// Records that `follower` follows `followed`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the edge already exists.
    async fn follow(&self, follower: UserId, followed: UserId) -> StorageResult<()>;

    /// Removes the edge; removing a missing edge is not an error.
    async fn unfollow(&self, follower: UserId, followed: UserId) -> StorageResult<()>;
}
