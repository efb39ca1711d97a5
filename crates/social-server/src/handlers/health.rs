use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use social_auth::BasicAuth;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
    env: &'a str,
    version: &'a str,
}

pub async fn health(_: BasicAuth, State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "ok",
        env: &state.environment,
        version: env!("CARGO_PKG_VERSION"),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Operational snapshot: rate windows and user cache statistics.
pub async fn debug_vars(_: BasicAuth, State(state): State<AppState>) -> impl IntoResponse {
    let rate_limiter = state.gate.rate_limiter().map(|limiter| {
        json!({
            "limit": limiter.limit(),
            "window_secs": limiter.window_size().as_secs_f64(),
            "metrics": limiter.metrics(),
        })
    });
    let cache = state.gate.users().stats();

    let body = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("GIT_COMMIT"),
        "env": &*state.environment,
        "rate_limiter": rate_limiter,
        "user_cache": {
            "enabled": state.gate.users().is_enabled(),
            "hit_rate": cache.hit_rate(),
            "stats": cache,
        },
    });
    (StatusCode::OK, Json(body))
}
