//! The request gatekeeper.
//!
//! Every authenticated request runs the same ordered pipeline:
//!
//! 1. rate check (skipped when the limiter is disabled)
//! 2. bearer extraction from the `Authorization` header
//! 3. token validation
//! 4. identity resolution through the [`UserCache`]
//! 5. ownership authorization, on ownership-gated routes only
//!
//! Each stage short-circuits with its own [`GateError`]. Store calls are
//! bounded by the configured store timeout; cache calls by the cache's own
//! command timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use social_storage::{Role, StorageError, User, UserId};
use subtle::ConstantTimeEq;

use crate::cache::UserCache;
use crate::config::{BasicAuthConfig, ConfigError};
use crate::error::{AuthFailure, GateError};
use crate::ratelimit::RateLimiter;
use crate::roles::RoleResolver;
use crate::token::{Claims, TokenAuthenticator};

/// Default deadline for a single store or cache call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Identity
// =============================================================================

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Snapshot of the user named by the token subject.
    pub user: User,
    /// The validated token claims.
    pub claims: Claims,
}

impl Identity {
    /// Returns the caller's user id.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Returns the caller's role.
    #[must_use]
    pub fn role(&self) -> &Role {
        &self.user.role
    }
}

// =============================================================================
// Gatekeeper
// =============================================================================

/// Orchestrates rate limiting, authentication and authorization.
pub struct Gatekeeper {
    limiter: Option<Arc<RateLimiter>>,
    tokens: TokenAuthenticator,
    users: UserCache,
    roles: RoleResolver,
    basic: BasicAuthConfig,
    store_timeout: Duration,
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("rate_limited", &self.limiter.is_some())
            .field("tokens", &self.tokens)
            .field("users", &self.users)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> GatekeeperBuilder {
        GatekeeperBuilder::default()
    }

    /// Returns the token authenticator.
    #[must_use]
    pub fn tokens(&self) -> &TokenAuthenticator {
        &self.tokens
    }

    /// Returns the user cache.
    #[must_use]
    pub fn users(&self) -> &UserCache {
        &self.users
    }

    /// Returns the rate limiter, if enabled.
    #[must_use]
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Runs the whole pipeline for one request.
    ///
    /// `ownership` is `(resource_owner_id, required_role)` for
    /// ownership-gated actions.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that rejects the request.
    pub async fn admit(
        &self,
        client: &str,
        authorization: Option<&str>,
        ownership: Option<(UserId, &str)>,
    ) -> Result<Identity, GateError> {
        self.check_rate(client)?;
        let identity = self.authenticate(authorization).await?;
        if let Some((owner_id, required_role)) = ownership {
            self.authorize_ownership(&identity, owner_id, required_role)
                .await?;
        }
        Ok(identity)
    }

    /// Stage 1: rate check for `client`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::RateLimited` when the client's window is full.
    pub fn check_rate(&self, client: &str) -> Result<(), GateError> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        let admission = limiter.admit(client);
        if admission.allowed {
            Ok(())
        } else {
            Err(GateError::RateLimited {
                retry_after: admission.retry_after,
            })
        }
    }

    /// Stages 2 to 4: bearer extraction, token validation and identity
    /// resolution.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed` for a missing, malformed or invalid token
    /// - `IdentityNotFound` if the subject no longer exists
    /// - `Timeout` or `Internal` if the store fails
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, GateError> {
        let header = authorization.ok_or_else(|| GateError::bearer(AuthFailure::Missing))?;
        let token = parse_bearer(header).map_err(GateError::bearer)?;

        let claims = self.tokens.validate(token).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            GateError::bearer(AuthFailure::from(&e))
        })?;

        let user_id = claims.sub;
        // The cache bounds the store read itself; a slow cache falls back.
        let user = self.users.resolve(user_id).await.map_err(|e| match e {
            StorageError::NotFound { .. } => {
                tracing::info!(user_id, "Token subject not found");
                GateError::IdentityNotFound { user_id }
            }
            StorageError::Timeout { .. } => {
                tracing::warn!(user_id, "Identity resolution timed out");
                GateError::Timeout {
                    stage: "identity_resolve",
                }
            }
            other => {
                tracing::error!(user_id, error = %other, "Failed to resolve identity");
                GateError::from(other)
            }
        })?;

        tracing::debug!(user_id, role = %user.role.name, "Request authenticated");
        Ok(Identity { user, claims })
    }

    /// Stage 5: may `identity` act on a resource owned by `owner_id`?
    ///
    /// Owners are always admitted. Otherwise the caller's role level must be
    /// at least that of `required_role`.
    ///
    /// # Errors
    ///
    /// - `AuthorizationDenied` if the level is too low or the role is unknown
    /// - `Timeout` or `Internal` if the store fails
    pub async fn authorize_ownership(
        &self,
        identity: &Identity,
        owner_id: UserId,
        required_role: &str,
    ) -> Result<(), GateError> {
        if identity.user_id() == owner_id {
            return Ok(());
        }

        let required = self
            .bounded("role_resolve", self.roles.resolve(required_role))
            .await?
            .map_err(|e| match e {
                StorageError::NotFound { .. } => {
                    tracing::warn!(role = %required_role, "Required role does not exist");
                    GateError::forbidden(format!("unknown role '{required_role}'"))
                }
                other => {
                    tracing::error!(
                        role = %required_role,
                        error = %other,
                        "Failed to resolve role"
                    );
                    GateError::from(other)
                }
            })?;

        if identity.role().outranks_or_equals(&required) {
            tracing::debug!(
                user_id = identity.user_id(),
                owner_id,
                role = %identity.role().name,
                required = %required.name,
                "Role precedence admits non-owner"
            );
            Ok(())
        } else {
            tracing::info!(
                user_id = identity.user_id(),
                owner_id,
                role = %identity.role().name,
                required = %required.name,
                "Role precedence denies non-owner"
            );
            Err(GateError::forbidden(format!(
                "role '{}' required",
                required.name
            )))
        }
    }

    /// Checks static basic credentials.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` with the basic scheme on any failure.
    pub fn check_basic(&self, authorization: Option<&str>) -> Result<(), GateError> {
        let header = authorization.ok_or_else(|| GateError::basic(AuthFailure::Missing))?;
        let (user, pass) = parse_basic(header).map_err(GateError::basic)?;

        let user_ok = user.as_bytes().ct_eq(self.basic.user.as_bytes());
        let pass_ok = pass.as_bytes().ct_eq(self.basic.pass.as_bytes());
        if bool::from(user_ok & pass_ok) {
            Ok(())
        } else {
            tracing::info!("Basic credentials rejected");
            Err(GateError::basic(AuthFailure::InvalidCredentials))
        }
    }

    /// Awaits a store call within the store timeout.
    ///
    /// Handlers use this for the lookups and mutations they run after the
    /// gate, so a stalled store maps to `GateError::Timeout` everywhere.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Timeout` naming `stage` if the deadline passes.
    pub async fn bounded<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = T>,
    ) -> Result<T, GateError> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| {
                let timeout_ms = self.store_timeout.as_millis() as u64;
                tracing::warn!(stage, timeout_ms, "Store call timed out");
                GateError::Timeout { stage }
            })
    }
}

/// Extracts the token from `Bearer <token>`.
fn parse_bearer(header: &str) -> Result<&str, AuthFailure> {
    let (scheme, token) = header.split_once(' ').ok_or(AuthFailure::Malformed)?;
    if scheme != "Bearer" || token.is_empty() || token.contains(' ') {
        return Err(AuthFailure::Malformed);
    }
    Ok(token)
}

/// Extracts `(user, pass)` from `Basic base64(user:pass)`.
fn parse_basic(header: &str) -> Result<(String, String), AuthFailure> {
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or(AuthFailure::Malformed)?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| AuthFailure::Malformed)?;
    let credentials = String::from_utf8(decoded).map_err(|_| AuthFailure::Malformed)?;
    let (user, pass) = credentials
        .split_once(':')
        .ok_or(AuthFailure::Malformed)?;
    Ok((user.to_string(), pass.to_string()))
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Gatekeeper`].
#[derive(Default)]
pub struct GatekeeperBuilder {
    limiter: Option<Arc<RateLimiter>>,
    tokens: Option<TokenAuthenticator>,
    users: Option<UserCache>,
    roles: Option<RoleResolver>,
    basic: BasicAuthConfig,
    store_timeout: Option<Duration>,
}

impl GatekeeperBuilder {
    /// Enables rate limiting with the given limiter.
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Sets the token authenticator.
    #[must_use]
    pub fn tokens(mut self, tokens: TokenAuthenticator) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Sets the user cache.
    #[must_use]
    pub fn users(mut self, users: UserCache) -> Self {
        self.users = Some(users);
        self
    }

    /// Sets the role resolver.
    #[must_use]
    pub fn roles(mut self, roles: RoleResolver) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Sets the static basic credentials.
    #[must_use]
    pub fn basic_credentials(mut self, basic: BasicAuthConfig) -> Self {
        self.basic = basic;
        self
    }

    /// Sets the deadline for each store or cache call.
    #[must_use]
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// Builds the gatekeeper.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the tokens, users or roles are unset.
    pub fn build(self) -> Result<Gatekeeper, ConfigError> {
        let store_timeout = self.store_timeout.unwrap_or(DEFAULT_STORE_TIMEOUT);
        let users = self
            .users
            .ok_or_else(|| ConfigError::Missing("user cache".to_string()))?;
        Ok(Gatekeeper {
            limiter: self.limiter,
            tokens: self
                .tokens
                .ok_or_else(|| ConfigError::Missing("token authenticator".to_string()))?,
            users: users.with_store_timeout(store_timeout),
            roles: self
                .roles
                .ok_or_else(|| ConfigError::Missing("role resolver".to_string()))?,
            basic: self.basic,
            store_timeout,
        })
    }
}
