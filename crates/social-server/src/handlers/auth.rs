//! Registration, account activation and token issuance.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use social_auth::{
    AuthFailure, GateError,
    invitation::{generate_activation_token, hash_activation_token},
    password::{hash_password, verify_password},
};
use social_storage::{Invitation, NewUser, StorageError};
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};
use crate::handlers::users::UserResponse;
use crate::state::AppState;

/// Role given to self-registered users.
pub const DEFAULT_ROLE: &str = "user";

const MAX_USERNAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 3..=72;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let username = self.username.trim();
        if username.is_empty() || username.len() > MAX_USERNAME_LEN {
            return Err(ApiError::BadRequest(format!(
                "username must be 1 to {MAX_USERNAME_LEN} characters"
            )));
        }
        let email = self.email.trim();
        if email.len() > MAX_EMAIL_LEN || !is_plausible_email(email) {
            return Err(ApiError::BadRequest("email is invalid".to_string()));
        }
        if !PASSWORD_LEN.contains(&self.password.chars().count()) {
            return Err(ApiError::BadRequest(format!(
                "password must be {} to {} characters",
                PASSWORD_LEN.start(),
                PASSWORD_LEN.end()
            )));
        }
        Ok(())
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.contains('@')
        }
        None => false,
    }
}

/// A new account and the token that activates it.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub token: String,
}

/// `POST /v1/users/authentication/user`
///
/// Creates an inactive account with the default role. The activation token is
/// returned once; only its digest is stored.
pub async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    request.validate()?;

    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))?;

    let user = state
        .gate
        .bounded(
            "user_create",
            state.users.create(NewUser {
                username: request.username.trim().to_string(),
                email: request.email.trim().to_string(),
                password_hash,
                role_name: DEFAULT_ROLE.to_string(),
                is_active: false,
            }),
        )
        .await??;

    let token = generate_activation_token();
    let expiry = time::Duration::try_from(state.invitation_expiry)
        .map_err(|e| ApiError::Internal(format!("invalid invitation expiry: {e}")))?;
    let invitation = Invitation {
        token_hash: hash_activation_token(&token),
        user_id: user.id,
        expires_at: OffsetDateTime::now_utc() + expiry,
    };
    let created = state
        .gate
        .bounded("invitation_create", state.invitations.create_invitation(invitation))
        .await
        .map_err(ApiError::from)
        .and_then(|result| result.map_err(ApiError::from));
    if let Err(e) = created {
        // Roll back the account; it could never be activated.
        if let Err(cleanup) = state.users.delete(user.id).await {
            tracing::error!(user_id = user.id, error = %cleanup, "Failed to remove user");
        }
        return Err(e);
    }

    tracing::info!(user_id = user.id, username = %user.username, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.into(),
            token,
        }),
    ))
}

/// `PUT /v1/users/activate/{token}`
///
/// Unknown, already used and expired tokens all answer 404.
pub async fn activate_user(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<StatusCode> {
    let token_hash = hash_activation_token(&token);
    let user = state
        .gate
        .bounded(
            "user_activate",
            state.invitations.activate(&token_hash, OffsetDateTime::now_utc()),
        )
        .await?
        .map_err(|e| match e {
            StorageError::NotFound { .. } => ApiError::NotFound("invitation".to_string()),
            other => other.into(),
        })?;

    state.gate.users().invalidate(user.id).await;
    tracing::info!(user_id = user.id, "User activated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// `POST /v1/authentication/token`
///
/// Unknown email, wrong password and an inactive account produce the same 401.
pub async fn create_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let rejected = || ApiError::Gate(GateError::bearer(AuthFailure::InvalidCredentials));

    let Some(user) = state.users.find_by_email(&request.email).await? else {
        tracing::info!("Token requested for unknown email");
        return Err(rejected());
    };

    let hash = user.password_hash.clone();
    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("password verification task failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("stored password hash is invalid: {e}")))?;

    if !verified {
        tracing::info!(user_id = user.id, "Token requested with wrong password");
        return Err(rejected());
    }

    if !user.is_active {
        tracing::info!(user_id = user.id, "Token requested for inactive user");
        return Err(rejected());
    }

    let tokens = state.gate.tokens();
    let token = tokens
        .issue(user.id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(user_id = user.id, "Token issued");
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token,
            token_type: "Bearer",
            expires_in: tokens.lifetime().as_secs(),
        }),
    ))
}
