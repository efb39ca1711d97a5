//! Shared application state.

use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;
use social_auth::{
    CacheBackend, ConfigError, Gatekeeper, RateLimiter, RoleResolver, TokenAuthenticator,
    UserCache,
};
use social_db_memory::SharedStore;
use social_storage::{
    CommentStorage, FollowerStorage, InvitationStorage, PostStorage, UserStorage,
};

use crate::config::AppConfig;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gatekeeper>,
    pub users: Arc<dyn UserStorage>,
    pub posts: Arc<dyn PostStorage>,
    pub comments: Arc<dyn CommentStorage>,
    pub followers: Arc<dyn FollowerStorage>,
    pub invitations: Arc<dyn InvitationStorage>,
    /// Lifetime of activation tokens handed out at registration.
    pub invitation_expiry: Duration,
    /// Deployment name reported by the health endpoint.
    pub environment: Arc<str>,
}

impl AppState {
    /// Wires the gatekeeper and handler stores around `store`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the gatekeeper cannot be assembled.
    pub fn new(
        config: &AppConfig,
        store: SharedStore,
        backend: CacheBackend,
    ) -> Result<Self, ConfigError> {
        let gate = build_gatekeeper(config, &store, backend)?;
        Ok(Self {
            gate: Arc::new(gate),
            users: store.clone(),
            posts: store.clone(),
            comments: store.clone(),
            followers: store.clone(),
            invitations: store,
            invitation_expiry: config.registration.invitation_expiry,
            environment: Arc::from(config.server.environment.as_str()),
        })
    }
}

impl FromRef<AppState> for Arc<Gatekeeper> {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}

/// Builds the request gatekeeper from configuration.
///
/// # Errors
///
/// Returns `ConfigError` if the gatekeeper cannot be assembled.
pub fn build_gatekeeper(
    config: &AppConfig,
    store: &SharedStore,
    backend: CacheBackend,
) -> Result<Gatekeeper, ConfigError> {
    let users = UserCache::from_config(store.clone(), backend, &config.cache);

    let mut builder = Gatekeeper::builder()
        .tokens(TokenAuthenticator::from_config(&config.auth.token))
        .users(users)
        .roles(RoleResolver::new(store.clone()))
        .basic_credentials(config.auth.basic.clone())
        .store_timeout(config.server.store_timeout);

    if config.rate_limiter.enabled {
        builder = builder.rate_limiter(Arc::new(RateLimiter::new(&config.rate_limiter)));
    } else {
        tracing::info!("Rate limiter disabled, all requests are admitted");
    }

    builder.build()
}
