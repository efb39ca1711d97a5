//! Error responses for gatekeeper rejections.
//!
//! Bodies are `{"error": "..."}`. Every authentication failure produces the
//! same body; only the challenge header depends on the expected scheme.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{AuthScheme, GateError, retry_after_secs};

/// Challenge sent with bearer authentication failures.
pub const BEARER_CHALLENGE: &str = "Bearer realm=\"api\", error=\"invalid_token\"";

/// Challenge sent with basic authentication failures.
pub const BASIC_CHALLENGE: &str = "Basic realm=\"restricted\", charset=\"UTF-8\"";

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);
        let mut headers = HeaderMap::new();

        match &self {
            GateError::RateLimited { retry_after } => {
                headers.insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs(retry_after)),
                );
            }
            GateError::AuthenticationFailed { scheme, .. } => {
                insert_challenge(&mut headers, *scheme);
            }
            GateError::IdentityNotFound { .. } => {
                insert_challenge(&mut headers, AuthScheme::Bearer);
            }
            _ => {}
        }

        (status, headers, Json(json!({ "error": message }))).into_response()
    }
}

fn insert_challenge(headers: &mut HeaderMap, scheme: AuthScheme) {
    let challenge = match scheme {
        AuthScheme::Bearer => BEARER_CHALLENGE,
        AuthScheme::Basic => BASIC_CHALLENGE,
    };
    headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
}

/// Extracts the HTTP status and public message from a `GateError`.
fn error_details(error: &GateError) -> (StatusCode, String) {
    match error {
        GateError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, error.to_string()),
        GateError::AuthenticationFailed { .. } | GateError::IdentityNotFound { .. } => {
            (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
        }
        GateError::AuthorizationDenied { .. } => (StatusCode::FORBIDDEN, "forbidden".to_string()),
        GateError::Timeout { .. } => (
            StatusCode::GATEWAY_TIMEOUT,
            "request timed out".to_string(),
        ),
        GateError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "the server encountered a problem".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthFailure;
    use std::time::Duration;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let response = GateError::RateLimited {
            retry_after: Duration::from_millis(2500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
        let body = body_of(response).await;
        assert_eq!(body["error"], "rate limit exceeded, retry after: 3s");
    }

    #[tokio::test]
    async fn test_authentication_failures_are_uniform() {
        let mut bodies = Vec::new();
        for reason in [
            AuthFailure::Missing,
            AuthFailure::Expired,
            AuthFailure::InvalidSignature,
            AuthFailure::IssuerMismatch,
        ] {
            let response = GateError::bearer(reason).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                response.headers()[header::WWW_AUTHENTICATE],
                BEARER_CHALLENGE
            );
            bodies.push(body_of(response).await);
        }
        let response = GateError::IdentityNotFound { user_id: 5 }.into_response();
        bodies.push(body_of(response).await);

        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_basic_challenge() {
        let response = GateError::basic(AuthFailure::InvalidCredentials).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"restricted\", charset=\"UTF-8\""
        );
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GateError::forbidden("x"), StatusCode::FORBIDDEN),
            (
                GateError::from(social_storage::StorageError::connection_error("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (GateError::Timeout { stage: "x" }, StatusCode::GATEWAY_TIMEOUT),
            (GateError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_internal_details_not_leaked() {
        let response = GateError::internal("pool poisoned at row 7").into_response();
        let body = body_of(response).await;
        assert_eq!(body["error"], "the server encountered a problem");
    }
}
