//! Startup data for the in-memory store.

use social_auth::password::hash_password;
use social_storage::{NewUser, StorageError, UserStorage};
use tracing::{info, warn};

use crate::config::AdminUserConfig;

/// Role assigned to the bootstrap admin.
const ADMIN_ROLE: &str = "admin";

/// Creates the configured admin user unless the email is already registered.
///
/// # Errors
///
/// Returns an error if hashing fails or the store rejects the user.
pub async fn bootstrap_admin_user(
    users: &dyn UserStorage,
    admin: &AdminUserConfig,
) -> anyhow::Result<()> {
    if users.find_by_email(&admin.email).await?.is_some() {
        info!(email = %admin.email, "Admin user already exists, skipping bootstrap");
        return Ok(());
    }

    let password_hash = hash_password(&admin.password)
        .map_err(|e| anyhow::anyhow!("failed to hash admin password: {e}"))?;

    match users
        .create(NewUser {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash,
            role_name: ADMIN_ROLE.to_string(),
            is_active: true,
        })
        .await
    {
        Ok(user) => {
            info!(user_id = user.id, username = %user.username, "Admin user created");
            Ok(())
        }
        Err(StorageError::Conflict { message }) => {
            warn!(%message, "Admin username already taken, skipping bootstrap");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
