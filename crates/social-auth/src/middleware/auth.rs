//! Axum extractors running the authentication stages.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use social_auth::middleware::BearerAuth;
//!
//! async fn whoami(BearerAuth(identity): BearerAuth) -> String {
//!     identity.user.username
//! }
//!
//! let app = Router::new()
//!     .route("/whoami", get(whoami))
//!     .with_state(gatekeeper);
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::{AuthFailure, GateError};
use crate::gatekeeper::{Gatekeeper, Identity};

/// Authenticated caller of a bearer-protected route.
///
/// Runs bearer extraction, token validation and identity resolution. The
/// rate check runs earlier, in [`rate_limit`](super::rate_limit).
pub struct BearerAuth(pub Identity);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    Arc<Gatekeeper>: FromRef<S>,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = Arc::<Gatekeeper>::from_ref(state);
        let authorization = authorization_header(parts)?;

        let identity = gate.authenticate(authorization).await.inspect_err(|e| {
            tracing::debug!(
                error = %e,
                endpoint = %parts.uri.path(),
                method = %parts.method,
                "Bearer authentication failed"
            );
        })?;

        Ok(BearerAuth(identity))
    }
}

/// Marker for routes guarded by the static basic credentials.
#[derive(Debug, Clone, Copy)]
pub struct BasicAuth;

impl<S> FromRequestParts<S> for BasicAuth
where
    S: Send + Sync,
    Arc<Gatekeeper>: FromRef<S>,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = Arc::<Gatekeeper>::from_ref(state);
        let authorization =
            authorization_header(parts).map_err(|_| GateError::basic(AuthFailure::Malformed))?;

        gate.check_basic(authorization)?;

        tracing::debug!(
            endpoint = %parts.uri.path(),
            method = %parts.method,
            "Operator authenticated via Basic Auth"
        );
        Ok(BasicAuth)
    }
}

/// Returns the `Authorization` header, rejecting non-UTF-8 values.
fn authorization_header(parts: &Parts) -> Result<Option<&str>, GateError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| GateError::bearer(AuthFailure::Malformed))
        })
        .transpose()
}
