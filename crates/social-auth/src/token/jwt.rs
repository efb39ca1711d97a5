//! JWT token generation and validation.
//!
//! Tokens are signed with HMAC SHA-256 using the configured secret. Claim
//! checks run in a fixed order and the first failure decides the
//! [`TokenError`]:
//!
//! 1. structure (three segments, decodable header and claims)
//! 2. signature
//! 3. `iss` and `aud` against the configured issuer
//! 4. `nbf <= now`
//! 5. `now < exp`
//!
//! ## Example
//!
//! ```ignore
//! use social_auth::token::TokenAuthenticator;
//!
//! let auth = TokenAuthenticator::new(b"secret", "socialmedia", Duration::from_secs(3600));
//! let token = auth.issue(42)?;
//! let claims = auth.validate(&token)?;
//! assert_eq!(claims.sub, 42);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::TokenConfig;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token is not a well-formed JWT.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the structural problem.
        message: String,
    },

    /// The signature does not match the configured secret.
    #[error("Invalid signature")]
    InvalidSignature,

    /// `iss` or `aud` does not match the configured issuer.
    #[error("Issuer or audience mismatch")]
    IssuerMismatch,

    /// The token is not valid yet.
    #[error("Token not yet valid")]
    NotYetValid,

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// Failed to sign a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },
}

impl TokenError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => Self::IssuerMismatch,
            _ => Self::malformed(err.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by a bearer token.
///
/// All timestamps are Unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: i64,

    /// Issued at.
    pub iat: i64,

    /// Not before.
    pub nbf: i64,

    /// Expiration time.
    pub exp: i64,

    /// Issuer.
    pub iss: String,

    /// Audience; always equal to the issuer.
    pub aud: String,
}

impl Claims {
    /// Creates a new builder for token claims.
    #[must_use]
    pub fn builder(issuer: impl Into<String>, subject: i64) -> ClaimsBuilder {
        ClaimsBuilder::new(issuer, subject)
    }
}

/// Builder for [`Claims`].
pub struct ClaimsBuilder {
    iss: String,
    sub: i64,
    iat: i64,
    nbf: Option<i64>,
    lifetime: i64,
}

impl ClaimsBuilder {
    fn new(issuer: impl Into<String>, subject: i64) -> Self {
        Self {
            iss: issuer.into(),
            sub: subject,
            iat: OffsetDateTime::now_utc().unix_timestamp(),
            nbf: None,
            lifetime: 3600,
        }
    }

    /// Sets the issue time; `nbf` defaults to it.
    #[must_use]
    pub fn issued_at(mut self, at: OffsetDateTime) -> Self {
        self.iat = at.unix_timestamp();
        self
    }

    /// Sets an explicit not-before time.
    #[must_use]
    pub fn not_before(mut self, at: OffsetDateTime) -> Self {
        self.nbf = Some(at.unix_timestamp());
        self
    }

    /// Sets the lifetime, counted from the issue time.
    #[must_use]
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Builds the claims.
    #[must_use]
    pub fn build(self) -> Claims {
        Claims {
            sub: self.sub,
            iat: self.iat,
            nbf: self.nbf.unwrap_or(self.iat),
            exp: self.iat.saturating_add(self.lifetime),
            aud: self.iss.clone(),
            iss: self.iss,
        }
    }
}

// ============================================================================
// Token Authenticator
// ============================================================================

/// Issues and validates bearer tokens.
pub struct TokenAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: Duration,
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("issuer", &self.issuer)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenAuthenticator {
    /// Creates a new authenticator.
    ///
    /// # Arguments
    /// * `secret` - HMAC secret used for signing and verification
    /// * `issuer` - Value required in both `iss` and `aud`
    /// * `lifetime` - Lifetime of tokens produced by [`issue`](Self::issue)
    #[must_use]
    pub fn new(secret: &[u8], issuer: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            lifetime,
        }
    }

    /// Creates an authenticator from configuration.
    #[must_use]
    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(config.secret.as_bytes(), &config.issuer, config.expiry)
    }

    /// Returns the configured issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the lifetime of issued tokens.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Signs the given claims.
    ///
    /// # Errors
    /// Returns `TokenError::Encoding` if signing fails.
    pub fn generate(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            TokenError::Encoding {
                message: e.to_string(),
            }
        })
    }

    /// Issues a token for `user_id` valid from now for the configured lifetime.
    ///
    /// # Errors
    /// Returns `TokenError::Encoding` if signing fails.
    pub fn issue(&self, user_id: i64) -> Result<String, TokenError> {
        let claims = Claims::builder(&self.issuer, user_id)
            .lifetime(self.lifetime)
            .build();
        self.generate(&claims)
    }

    /// Validates a token against the current time.
    ///
    /// # Errors
    /// Returns the first failed check, see the module documentation.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, OffsetDateTime::now_utc())
    }

    /// Validates a token as of `now`.
    ///
    /// # Errors
    /// Returns the first failed check, see the module documentation.
    pub fn validate_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::malformed("token must have three segments"));
        }

        // Signature and structure only; the claim checks below run in a fixed order.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;

        if claims.iss != self.issuer || claims.aud != self.issuer {
            return Err(TokenError::IssuerMismatch);
        }

        let now = now.unix_timestamp();
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration as TimeDuration;

    const ISSUER: &str = "socialmedia";

    fn authenticator() -> TokenAuthenticator {
        TokenAuthenticator::new(b"test-secret", ISSUER, Duration::from_secs(3600))
    }

    #[test]
    fn test_generate_validate() {
        let auth = authenticator();
        let token = auth.issue(42).unwrap();

        let claims = auth.validate(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, ISSUER);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_with_valid_signature() {
        let auth = authenticator();
        let issued = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let claims = Claims::builder(ISSUER, 1)
            .issued_at(issued)
            .lifetime(Duration::from_secs(3600))
            .build();
        let token = auth.generate(&claims).unwrap();

        assert!(matches!(auth.validate(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_expiry_boundary() {
        let auth = authenticator();
        let issued = OffsetDateTime::UNIX_EPOCH + TimeDuration::days(20_000);
        let claims = Claims::builder(ISSUER, 1)
            .issued_at(issued)
            .lifetime(Duration::from_secs(60))
            .build();
        let token = auth.generate(&claims).unwrap();

        let just_before = issued + TimeDuration::seconds(59);
        assert!(auth.validate_at(&token, just_before).is_ok());

        let at_exp = issued + TimeDuration::seconds(60);
        assert!(matches!(
            auth.validate_at(&token, at_exp),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_not_yet_valid() {
        let auth = authenticator();
        let now = OffsetDateTime::now_utc();
        let claims = Claims::builder(ISSUER, 1)
            .issued_at(now)
            .not_before(now + TimeDuration::minutes(10))
            .lifetime(Duration::from_secs(3600))
            .build();
        let token = auth.generate(&claims).unwrap();

        assert!(matches!(auth.validate(&token), Err(TokenError::NotYetValid)));
    }

    #[test]
    fn test_not_before_checked_before_expiry() {
        let auth = authenticator();
        let now = OffsetDateTime::now_utc();
        // nbf in the future and exp in the past: nbf is reported.
        let claims = Claims {
            sub: 1,
            iat: now.unix_timestamp() - 100,
            nbf: now.unix_timestamp() + 100,
            exp: now.unix_timestamp() - 50,
            iss: ISSUER.to_string(),
            aud: ISSUER.to_string(),
        };
        let token = auth.generate(&claims).unwrap();

        assert!(matches!(auth.validate(&token), Err(TokenError::NotYetValid)));
    }

    #[test]
    fn test_wrong_secret() {
        let auth = authenticator();
        let other = TokenAuthenticator::new(b"other-secret", ISSUER, Duration::from_secs(3600));
        let token = other.issue(1).unwrap();

        assert!(matches!(
            auth.validate(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_signature_checked_before_issuer() {
        let other = TokenAuthenticator::new(b"other-secret", "elsewhere", Duration::from_secs(60));
        let token = other.issue(1).unwrap();

        assert!(matches!(
            authenticator().validate(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_issuer_mismatch() {
        let auth = authenticator();
        let claims = Claims::builder("elsewhere", 1)
            .lifetime(Duration::from_secs(3600))
            .build();
        let token = auth.generate(&claims).unwrap();

        assert!(matches!(
            auth.validate(&token),
            Err(TokenError::IssuerMismatch)
        ));
    }

    #[test]
    fn test_audience_mismatch() {
        let auth = authenticator();
        let mut claims = Claims::builder(ISSUER, 1)
            .lifetime(Duration::from_secs(3600))
            .build();
        claims.aud = "someone-else".to_string();
        let token = auth.generate(&claims).unwrap();

        assert!(matches!(
            auth.validate(&token),
            Err(TokenError::IssuerMismatch)
        ));
    }

    #[test]
    fn test_malformed() {
        let auth = authenticator();

        assert!(matches!(
            auth.validate("not-a-token"),
            Err(TokenError::Malformed { .. })
        ));
        assert!(matches!(
            auth.validate("a.b.c"),
            Err(TokenError::Malformed { .. })
        ));
        assert!(matches!(auth.validate(""), Err(TokenError::Malformed { .. })));
    }

    #[test]
    fn test_from_config() {
        let config = TokenConfig::default();
        let auth = TokenAuthenticator::from_config(&config);
        assert_eq!(auth.issuer(), "socialmedia");
        assert_eq!(auth.lifetime(), Duration::from_secs(3 * 24 * 3600));
        assert!(format!("{auth:?}").contains("socialmedia"));
    }

    #[test]
    fn test_claims_builder_defaults_nbf_to_iat() {
        let at = OffsetDateTime::UNIX_EPOCH + TimeDuration::days(1);
        let claims = Claims::builder(ISSUER, 9)
            .issued_at(at)
            .lifetime(Duration::from_secs(10))
            .build();
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.exp, claims.iat + 10);
    }
}
