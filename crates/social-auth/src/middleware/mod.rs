//! HTTP middleware for the gatekeeper.
//!
//! - [`rate_limit`]: stage 1, applied as a router layer
//! - [`BearerAuth`]: stages 2 to 4, as an extractor
//! - [`BasicAuth`]: static operator credentials
//! - `IntoResponse` for [`GateError`](crate::GateError)
//!
//! Ownership checks need the loaded resource, so handlers call
//! [`Gatekeeper::authorize_ownership`](crate::Gatekeeper::authorize_ownership)
//! themselves.

pub mod auth;
pub mod error;
pub mod rate_limit;

pub use auth::{BasicAuth, BearerAuth};
pub use error::{BASIC_CHALLENGE, BEARER_CHALLENGE};
pub use rate_limit::{UNKNOWN_CLIENT, client_key, rate_limit};
