use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_POLICY_CHANNEL: &str = "kasir:policy:reload";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Full database URL. When empty it is assembled from the `db_*` parts.
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub db_host: Option<String>,
    #[serde(default)]
    pub db_port: Option<u16>,
    #[serde(default)]
    pub db_user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// HS256 signing secret
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,
    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Access-log index endpoint. Accepted so deployments can set it; nothing ships logs there.
    #[serde(default)]
    pub log_endpoint: Option<String>,

    /// Per-request deadline applied by the HTTP timeout layer
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    pub redis_url: String,
    #[serde(default)]
    pub redis_addr: Option<String>,
    #[serde(default)]
    pub redis_password: Option<String>,
    #[serde(default)]
    pub redis_db: Option<u8>,

    /// CSV policy file. Falls back to the bundled policy when unset.
    #[serde(default)]
    pub policy_path: Option<String>,
    #[serde(default = "default_policy_channel")]
    pub policy_channel: String,

    #[serde(default)]
    pub ipaymu_base_url: Option<String>,
    #[serde(default)]
    pub ipaymu_api_key: Option<String>,
    #[serde(default)]
    pub ipaymu_va: Option<String>,
    #[serde(default)]
    pub tsm_base_url: Option<String>,
    #[serde(default)]
    pub tsm_api_key: Option<String>,
    #[serde(default)]
    pub tsm_va: Option<String>,
    #[serde(default)]
    pub payment_return_url: Option<String>,
    #[serde(default)]
    pub payment_cancel_url: Option<String>,
    #[serde(default)]
    pub payment_notify_url: Option<String>,
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_from")]
    pub smtp_from: String,
    #[serde(default = "default_email_queue_capacity")]
    #[validate(range(min = 1))]
    pub email_queue_capacity: usize,

    /// Google sign-in credentials. Recognized, not used by any route.
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    #[serde(default)]
    pub oauth_client_secret: Option<String>,
    #[serde(default)]
    pub oauth_redirect_url: Option<String>,
}

impl AppConfig {
    pub fn new(
        database_url: String,
        redis_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            db_host: None,
            db_port: None,
            db_user: None,
            db_password: None,
            db_name: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            auto_migrate: false,
            jwt_secret,
            jwt_expiration: default_jwt_expiration(),
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            log_endpoint: None,
            request_timeout_secs: default_request_timeout_secs(),
            cors_allowed_origins: None,
            redis_url,
            redis_addr: None,
            redis_password: None,
            redis_db: None,
            policy_path: None,
            policy_channel: default_policy_channel(),
            ipaymu_base_url: None,
            ipaymu_api_key: None,
            ipaymu_va: None,
            tsm_base_url: None,
            tsm_api_key: None,
            tsm_va: None,
            payment_return_url: None,
            payment_cancel_url: None,
            payment_notify_url: None,
            gateway_timeout_secs: default_gateway_timeout_secs(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_user: None,
            smtp_password: None,
            smtp_from: default_smtp_from(),
            email_queue_capacity: default_email_queue_capacity(),
            oauth_client_id: None,
            oauth_client_secret: None,
            oauth_redirect_url: None,
        }
    }

    /// Database URL, assembled from host/port/user/password/name when no full URL is set.
    pub fn database_url(&self) -> String {
        if !self.database_url.trim().is_empty() {
            return self.database_url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user.as_deref().unwrap_or("postgres"),
            self.db_password.as_deref().unwrap_or(""),
            self.db_host.as_deref().unwrap_or("localhost"),
            self.db_port.unwrap_or(5432),
            self.db_name.as_deref().unwrap_or("kasir"),
        )
    }

    /// Redis URL, assembled from addr/password/db when `redis_addr` is set.
    pub fn redis_url(&self) -> String {
        match &self.redis_addr {
            Some(addr) => {
                let auth = self
                    .redis_password
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(|p| format!(":{}@", p))
                    .unwrap_or_default();
                format!("redis://{}{}/{}", auth, addr, self.redis_db.unwrap_or(0))
            }
            None => self.redis_url.clone(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_jwt_expiration() -> u64 {
    86_400
}
fn default_auth_issuer() -> String {
    "kasir-api".to_string()
}
fn default_auth_audience() -> String {
    "kasir-clients".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_policy_channel() -> String {
    DEFAULT_POLICY_CHANNEL.to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    15
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_from() -> String {
    "Kasir <no-reply@kasir.local>".to_string()
}
fn default_email_queue_capacity() -> usize {
    100
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();
    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must have at least 10 unique characters".into());
        return Err(err);
    }
    const DISALLOWED: [&str; 3] = ["changeme", "your-secret-key", "default-secret-key"];
    if DISALLOWED
        .iter()
        .any(|bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("kasir_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());

    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "")?
        .set_default("redis_url", "redis://127.0.0.1:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            String::new(),
            "redis://127.0.0.1:6379".into(),
            "k4s1r-t3st-s3cret-with-enough-entropy-0987".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        )
    }

    #[test]
    fn database_url_is_assembled_from_parts() {
        let mut cfg = base_config();
        cfg.db_host = Some("db.internal".into());
        cfg.db_port = Some(6543);
        cfg.db_user = Some("pos".into());
        cfg.db_password = Some("pw".into());
        cfg.db_name = Some("kasir_prod".into());
        assert_eq!(
            cfg.database_url(),
            "postgres://pos:pw@db.internal:6543/kasir_prod"
        );

        cfg.database_url = "sqlite://local.db?mode=rwc".into();
        assert_eq!(cfg.database_url(), "sqlite://local.db?mode=rwc");
    }

    #[test]
    fn redis_url_prefers_addr_parts() {
        let mut cfg = base_config();
        assert_eq!(cfg.redis_url(), "redis://127.0.0.1:6379");

        cfg.redis_addr = Some("cache:6380".into());
        cfg.redis_password = Some("hunter2".into());
        cfg.redis_db = Some(3);
        assert_eq!(cfg.redis_url(), "redis://:hunter2@cache:6380/3");
    }

    #[test]
    fn weak_jwt_secret_is_rejected() {
        let mut cfg = base_config();
        assert!(cfg.validate().is_ok());

        cfg.jwt_secret = "a".repeat(40);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }
}
