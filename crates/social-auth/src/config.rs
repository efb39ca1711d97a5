//! Gatekeeper configuration.
//!
//! This module provides the configuration types for the request gatekeeper:
//! token signing, static basic credentials, the fixed-window rate limiter,
//! and the user cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.token]
/// secret = "change-me"
/// expiry = "3d"
/// issuer = "socialmedia"
///
/// [auth.basic]
/// user = "admin"
/// pass = "admin"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token signing and validation.
    pub token: TokenConfig,

    /// Static credentials guarding the operational endpoints.
    pub basic: BasicAuthConfig,
}

/// Bearer token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HMAC secret used to sign and verify tokens.
    pub secret: String,

    /// Token lifetime, from issuance to `exp`.
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,

    /// Value placed in (and required of) the `iss` and `aud` claims.
    pub issuer: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: "example".to_string(),
            expiry: Duration::from_secs(3 * 24 * 3600), // 3 days
            issuer: "socialmedia".to_string(),
        }
    }
}

/// Static basic-auth credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BasicAuthConfig {
    pub user: String,
    pub pass: String,
}

impl Default for BasicAuthConfig {
    fn default() -> Self {
        Self {
            user: "admin".to_string(),
            pass: "admin".to_string(),
        }
    }
}

/// Fixed-window rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// When disabled the gatekeeper never consults the limiter.
    pub enabled: bool,

    /// Requests admitted per key within one window.
    pub requests_per_window: u32,

    /// Length of a window.
    #[serde(with = "humantime_serde")]
    pub window_size: Duration,

    /// How often idle windows are swept.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Windows older than this many `window_size`s are evicted by the sweep.
    pub eviction_windows: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 20,
            window_size: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            eviction_windows: 3,
        }
    }
}

impl RateLimiterConfig {
    /// Age past which a window is considered idle.
    #[must_use]
    pub fn eviction_age(&self) -> Duration {
        self.window_size.saturating_mul(self.eviction_windows)
    }
}

/// User cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When disabled every identity resolution reads the store.
    pub enabled: bool,

    /// Lifetime of a cached user snapshot.
    #[serde(with = "humantime_serde")]
    pub user_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_ttl: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the token secret or issuer is empty,
    /// and `ConfigError::InvalidValue` if the token expiry is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.secret.is_empty() {
            return Err(ConfigError::Missing("auth.token.secret".to_string()));
        }

        if self.token.issuer.is_empty() {
            return Err(ConfigError::Missing("auth.token.issuer".to_string()));
        }

        if self.token.expiry.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.token.expiry must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl RateLimiterConfig {
    /// Validates the configuration.
    ///
    /// Limits are checked even when the limiter is disabled so that enabling
    /// it later through the environment cannot produce a broken limiter.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero limit, window, sweep
    /// interval or eviction multiplier.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_per_window == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limiter.requests_per_window must be > 0".to_string(),
            ));
        }

        if self.window_size.is_zero() {
            return Err(ConfigError::InvalidValue(
                "rate_limiter.window_size must be > 0".to_string(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "rate_limiter.sweep_interval must be > 0".to_string(),
            ));
        }

        if self.eviction_windows == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limiter.eviction_windows must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.token.issuer, "socialmedia");
        assert_eq!(config.token.expiry, Duration::from_secs(259_200));
        assert_eq!(config.basic.user, "admin");
    }

    #[test]
    fn test_default_config_validates() {
        assert!(AuthConfig::default().validate().is_ok());
        assert!(RateLimiterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_secret_fails_validation() {
        let mut config = AuthConfig::default();
        config.token.secret = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.token.issuer = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("issuer"));
    }

    #[test]
    fn test_zero_limit_fails_validation() {
        let config = RateLimiterConfig {
            requests_per_window: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requests_per_window"));
    }

    #[test]
    fn test_zero_window_fails_even_when_disabled() {
        let config = RateLimiterConfig {
            enabled: false,
            window_size: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_eviction_age() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.eviction_age(), Duration::from_secs(15));
    }

    #[test]
    fn test_humantime_durations() {
        let json = r#"{"enabled": false, "window_size": "1s", "sweep_interval": "2m"}"#;
        let config: RateLimiterConfig = serde_json::from_str(json).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.window_size, Duration::from_secs(1));
        assert_eq!(config.sweep_interval, Duration::from_secs(120));
        assert_eq!(config.requests_per_window, 20);
    }

    #[test]
    fn test_cache_defaults() {
        let cache = CacheConfig::default();
        assert!(cache.enabled);
        assert_eq!(cache.user_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("test error".to_string());
        assert_eq!(err.to_string(), "Invalid configuration value: test error");
    }
}
