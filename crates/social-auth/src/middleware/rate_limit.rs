//! Rate-limit middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State, rejection::ExtensionRejection},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::gatekeeper::Gatekeeper;

/// Key used when the peer address is unavailable.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Runs the rate check before anything else in the request.
///
/// The client key is the peer IP taken from [`ConnectInfo`]; serve the router
/// with `into_make_service_with_connect_info::<SocketAddr>()`. The extractor
/// also honours `MockConnectInfo` in tests.
///
/// ```ignore
/// let app = router.layer(axum::middleware::from_fn_with_state(gate.clone(), rate_limit));
/// ```
pub async fn rate_limit(
    State(gate): State<Arc<Gatekeeper>>,
    peer: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(peer.ok().map(|ConnectInfo(addr)| addr));
    match gate.check_rate(&client) {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

/// Returns the rate-limit key for a peer: its IP, or [`UNKNOWN_CLIENT`].
pub fn client_key(peer: Option<SocketAddr>) -> String {
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
