//! Record types shared by every storage backend.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier of a user row.
pub type UserId = i64;

/// Identifier of a post row.
pub type PostId = i64;

// =============================================================================
// Role
// =============================================================================

/// A role in the authorization system.
///
/// Roles are totally ordered by `level`; a higher level carries more
/// privilege than any lower one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name (e.g. "user", "moderator", "admin").
    pub name: String,

    /// Precedence level.
    pub level: i32,

    /// Human-readable description of the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Role {
    /// Creates a new role with the given name and level.
    #[must_use]
    pub fn new(name: impl Into<String>, level: i32) -> Self {
        Self {
            name: name.into(),
            level,
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns `true` if this role's privileges dominate `other`'s.
    #[must_use]
    pub fn outranks_or_equals(&self, other: &Role) -> bool {
        self.level >= other.level
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered user.
///
/// Values handed out by a store are snapshots: mutating one does not change
/// the stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,

    /// Public handle.
    pub username: String,

    /// Login email address.
    pub email: String,

    /// Argon2 PHC string of the user's password.
    pub password_hash: String,

    /// The role assigned to the user.
    pub role: Role,

    /// Whether the account has been activated. Inactive users cannot log in.
    pub is_active: bool,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Data required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Public handle.
    pub username: String,
    /// Login email address.
    pub email: String,
    /// Argon2 PHC string of the password (hashing happens before the store).
    pub password_hash: String,
    /// Name of the role to assign.
    pub role_name: String,
    /// Create the account already activated.
    pub is_active: bool,
}

// =============================================================================
// Invitations
// =============================================================================

/// A pending account activation.
///
/// Only the hash of the activation token is stored; the plain token is
/// handed to the registering user once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    /// SHA-256 hex digest of the activation token.
    pub token_hash: String,
    /// The user to activate.
    pub user_id: UserId,
    /// After this instant the invitation can no longer be redeemed.
    pub expires_at: OffsetDateTime,
}

impl Invitation {
    /// Returns `true` if the invitation can no longer be redeemed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// Posts and comments
// =============================================================================

/// A post owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier.
    pub id: PostId,
    /// The user who wrote the post.
    pub owner_id: UserId,
    /// Title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optimistic-concurrency version, bumped on every update.
    pub version: i64,
    /// When the post was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the post was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Data required to create a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub owner_id: UserId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// Partial update of a post; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl PostPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Data required to create a comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
}
