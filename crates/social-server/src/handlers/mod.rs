//! HTTP handlers for the `/v1` API.

pub mod auth;
pub mod health;
pub mod posts;
pub mod users;
