//! Gatekeeper error types.
//!
//! Every pipeline stage short-circuits with its own [`GateError`] variant.
//! Authentication failures carry the precise [`AuthFailure`] for logging, but
//! the HTTP response never reveals which check failed.

use std::fmt;
use std::time::Duration;

use social_storage::StorageError;

use crate::token::TokenError;

/// The credential scheme an authentication failure relates to.
///
/// It selects the `WWW-Authenticate` challenge sent back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `Authorization: Basic base64(user:pass)`.
    Basic,
}

/// Why authentication failed. Internal only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailure {
    /// No `Authorization` header.
    Missing,
    /// The header or the token could not be parsed.
    Malformed,
    /// The token signature does not verify.
    InvalidSignature,
    /// The token is past its `exp`.
    Expired,
    /// The token's `nbf` is in the future.
    NotYetValid,
    /// `iss` or `aud` differs from the configured issuer.
    IssuerMismatch,
    /// Basic credentials, or email and password, did not match.
    InvalidCredentials,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Malformed => write!(f, "malformed"),
            Self::InvalidSignature => write!(f, "invalid_signature"),
            Self::Expired => write!(f, "expired"),
            Self::NotYetValid => write!(f, "not_yet_valid"),
            Self::IssuerMismatch => write!(f, "issuer_mismatch"),
            Self::InvalidCredentials => write!(f, "invalid_credentials"),
        }
    }
}

impl From<&TokenError> for AuthFailure {
    fn from(err: &TokenError) -> Self {
        match err {
            TokenError::Malformed { .. } | TokenError::Encoding { .. } => Self::Malformed,
            TokenError::InvalidSignature => Self::InvalidSignature,
            TokenError::IssuerMismatch => Self::IssuerMismatch,
            TokenError::NotYetValid => Self::NotYetValid,
            TokenError::Expired => Self::Expired,
        }
    }
}

/// Errors produced by the request gatekeeper.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The client exhausted its window.
    #[error("rate limit exceeded, retry after: {}s", retry_after_secs(.retry_after))]
    RateLimited {
        /// Time until the current window closes.
        retry_after: Duration,
    },

    /// Credentials were absent or rejected.
    #[error("Authentication failed ({scheme:?}): {reason}")]
    AuthenticationFailed {
        /// Scheme of the credentials that were expected.
        scheme: AuthScheme,
        /// The first check that failed.
        reason: AuthFailure,
    },

    /// The caller may not act on the resource.
    #[error("Forbidden: {message}")]
    AuthorizationDenied {
        /// Description of why access is denied.
        message: String,
    },

    /// The token's subject no longer exists.
    #[error("Identity not found: {user_id}")]
    IdentityNotFound {
        /// The subject from the validated token.
        user_id: i64,
    },

    /// A store or cache call exceeded its deadline.
    #[error("Timeout during {stage}")]
    Timeout {
        /// The pipeline stage that timed out.
        stage: &'static str,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl GateError {
    /// Creates a new `AuthenticationFailed` error for a bearer token.
    #[must_use]
    pub fn bearer(reason: AuthFailure) -> Self {
        Self::AuthenticationFailed {
            scheme: AuthScheme::Bearer,
            reason,
        }
    }

    /// Creates a new `AuthenticationFailed` error for basic credentials.
    #[must_use]
    pub fn basic(reason: AuthFailure) -> Self {
        Self::AuthenticationFailed {
            scheme: AuthScheme::Basic,
            reason,
        }
    }

    /// Creates a new `AuthorizationDenied` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<StorageError> for GateError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Timeout { operation } => Self::Timeout { stage: operation },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Whole seconds until retry, rounded up so clients never retry early.
pub(crate) fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GateError::RateLimited {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "rate limit exceeded, retry after: 2s");

        let err = GateError::bearer(AuthFailure::Expired);
        assert_eq!(err.to_string(), "Authentication failed (Bearer): expired");

        let err = GateError::Timeout {
            stage: "identity_resolve",
        };
        assert_eq!(err.to_string(), "Timeout during identity_resolve");
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(&Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(&Duration::from_millis(10)), 1);
        assert_eq!(retry_after_secs(&Duration::ZERO), 1);
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: GateError = StorageError::connection_error("refused").into();
        assert!(matches!(err, GateError::Internal { .. }));

        let err: GateError = StorageError::internal("corrupt row").into();
        assert!(matches!(err, GateError::Internal { .. }));

        let err: GateError = StorageError::timeout("post_load").into();
        assert!(matches!(err, GateError::Timeout { stage: "post_load" }));
    }

    #[test]
    fn test_token_error_mapping() {
        assert_eq!(
            AuthFailure::from(&TokenError::Expired),
            AuthFailure::Expired
        );
        assert_eq!(
            AuthFailure::from(&TokenError::malformed("bad header")),
            AuthFailure::Malformed
        );
    }
}
