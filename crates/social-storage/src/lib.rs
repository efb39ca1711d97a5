//! # social-storage
//!
//! Storage abstraction layer for the social API.
//!
//! This crate defines the records and traits every storage backend must
//! implement. It contains no implementations; see `social-db-memory` for the
//! in-memory backend.
//!
//! ## Overview
//!
//! - [`UserStorage`] and [`RoleStorage`] feed the request gatekeeper
//!   (identity resolution and role precedence).
//! - [`InvitationStorage`] holds pending account activations.
//! - [`PostStorage`], [`CommentStorage`] and [`FollowerStorage`] back the
//!   business handlers.

mod error;
mod traits;
mod types;

pub use error::StorageError;
pub use traits::{
    CommentStorage, FollowerStorage, InvitationStorage, PostStorage, RoleStorage, StorageResult,
    UserStorage,
};
pub use types::{
    Comment, Invitation, NewComment, NewPost, NewUser, Post, PostId, PostPatch, Role, User,
    UserId,
};
