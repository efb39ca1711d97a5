//! # social-auth
//!
//! The request gatekeeper for the social API.
//!
//! Every authenticated request passes four mechanisms before reaching
//! business logic:
//!
//! - a fixed-window rate limiter keyed by client address
//! - bearer-token authentication with ordered claim checks
//! - a read-through cache fronting the user store
//! - role-precedence authorization for actions on resources the caller
//!   does not own
//!
//! ## Modules
//!
//! - [`config`] - Gatekeeper configuration
//! - [`ratelimit`] - Fixed-window rate limiter
//! - [`token`] - Token generation and validation
//! - [`cache`] - User cache and its backends
//! - [`roles`] - Role precedence lookup
//! - [`gatekeeper`] - The ordered request pipeline
//! - [`middleware`] - Axum middleware, extractors and error responses
//! - [`password`] - Password hashing
//! - [`invitation`] - Account activation tokens

pub mod cache;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod invitation;
pub mod middleware;
pub mod password;
pub mod ratelimit;
pub mod roles;
pub mod token;

#[cfg(test)]
mod testutil;

pub use cache::{CacheBackend, UserCache};
pub use config::{AuthConfig, CacheConfig, ConfigError, RateLimiterConfig};
pub use error::{AuthFailure, AuthScheme, GateError};
pub use gatekeeper::{Gatekeeper, GatekeeperBuilder, Identity};
pub use middleware::{BasicAuth, BearerAuth};
pub use ratelimit::{Admission, RateLimiter, RateWindow};
pub use roles::RoleResolver;
pub use token::{Claims, TokenAuthenticator, TokenError};
