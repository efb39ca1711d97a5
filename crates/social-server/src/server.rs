use std::net::SocketAddr;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use social_auth::middleware::rate_limit;
use social_db_memory::create_store;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    bootstrap,
    config::AppConfig,
    create_cache_backend,
    handlers::{auth, health, posts, users},
    state::AppState,
};

pub struct SocialServer {
    addr: SocketAddr,
    app: Router,
    sweeper: Option<JoinHandle<()>>,
}

/// Builds the `/v1` router around `state`.
///
/// Layer order, outermost first: trace, CORS, timeout, rate limit. The rate
/// limit therefore runs before any route extractor.
pub fn build_router(state: AppState, cfg: &AppConfig) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .route("/debug/vars", get(health::debug_vars))
        .route("/authentication/token", post(auth::create_token))
        .route("/posts", post(posts::create_post))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/{id}/comments", post(posts::create_comment))
        .route("/users/authentication/user", post(auth::register_user))
        .route("/users/activate/{token}", put(auth::activate_user))
        .route("/users/{id}", get(users::get_user).delete(users::delete_user))
        .route("/users/{id}/follow", put(users::follow_user))
        .route("/users/{id}/unfollow", put(users::unfollow_user));

    Router::new()
        .nest("/v1", api)
        .layer(middleware::from_fn_with_state(state.gate.clone(), rate_limit))
        .layer(TimeoutLayer::new(cfg.server.request_timeout))
        .layer(cors_layer(cfg))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .with_state(state)
}

fn cors_layer(cfg: &AppConfig) -> CorsLayer {
    let Some(origin) = cfg.server.cors_origin.as_deref() else {
        return CorsLayer::permissive();
    };
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers(Any);
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
        Err(e) => {
            // Rejected by config validation; without an origin no cross-origin request passes.
            tracing::warn!(origin, error = %e, "Invalid CORS origin");
            layer
        }
    }
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Creates the store, cache and gatekeeper and assembles the router.
    pub async fn build(self) -> anyhow::Result<SocialServer> {
        let cfg = self.config;
        let store = create_store();

        if let Some(admin) = &cfg.bootstrap.admin_user {
            bootstrap::bootstrap_admin_user(store.as_ref(), admin).await?;
        }

        let backend = create_cache_backend(&cfg.redis, &cfg.cache).await;
        let state = AppState::new(&cfg, store, backend)?;

        let sweeper = state
            .gate
            .rate_limiter()
            .map(|limiter| limiter.spawn_sweeper(cfg.rate_limiter.sweep_interval));

        Ok(SocialServer {
            addr: cfg.addr(),
            app: build_router(state, &cfg),
            sweeper,
        })
    }
}

impl SocialServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
