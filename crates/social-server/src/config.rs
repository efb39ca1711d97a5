use serde::{Deserialize, Serialize};
use social_auth::config::{AuthConfig, CacheConfig, RateLimiterConfig};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Fixed-window rate limiting per client address
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    /// Bearer token and basic credential configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// User cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Self-service registration
    #[serde(default)]
    pub registration: RegistrationConfig,
    /// Bootstrap configuration (initial admin user)
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout.is_zero() || self.server.store_timeout.is_zero() {
            return Err("server timeouts must be > 0".into());
        }
        if let Some(origin) = &self.server.cors_origin {
            if axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(format!("server.cors_origin is not a valid header value: {origin}"));
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.rate_limiter
            .validate()
            .map_err(|e| format!("rate limiter config error: {e}"))?;
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        if self.cache.enabled && self.cache.user_ttl.is_zero() {
            return Err("cache.user_ttl must be > 0 when the cache is enabled".into());
        }
        if self.registration.invitation_expiry.is_zero() {
            return Err("registration.invitation_expiry must be > 0".into());
        }
        if self.redis.enabled && self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if let Some(admin) = &self.bootstrap.admin_user {
            if admin.email.is_empty() || admin.password.is_empty() {
                return Err("bootstrap.admin_user requires email and password".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deployment name reported by the health endpoint
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Upper bound on handling one request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Upper bound on each store call made on behalf of a request
    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub store_timeout: Duration,
    /// Allowed CORS origin; unset allows any origin
    #[serde(default)]
    pub cors_origin: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_store_timeout() -> Duration {
    social_auth::gatekeeper::DEFAULT_STORE_TIMEOUT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            request_timeout: default_request_timeout(),
            store_timeout: default_store_timeout(),
            cors_origin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".to_string()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Redis configuration for the shared user cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false (local cache only)
    #[serde(default)]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection and per-command timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    500
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// How long an activation token stays valid
    #[serde(default = "default_invitation_expiry", with = "humantime_serde")]
    pub invitation_expiry: Duration,
}

fn default_invitation_expiry() -> Duration {
    Duration::from_secs(3 * 24 * 60 * 60)
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            invitation_expiry: default_invitation_expiry(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// If set, creates an admin user on startup (if not already exists)
    #[serde(default)]
    pub admin_user: Option<AdminUserConfig>,
}

/// Configuration for bootstrapping an admin user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUserConfig {
    pub username: String,
    /// Login email address
    pub email: String,
    /// Admin password in plain text (will be hashed)
    /// Prefer the SOCIAL__BOOTSTRAP__ADMIN_USER__PASSWORD env var
    pub password: String,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, used when no path is given.
    pub const DEFAULT_CONFIG_PATH: &str = "social.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SOCIAL__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("SOCIAL")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
