use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STORE_BACKEND: &str = "sql";
const DEFAULT_DATABASE_URL: &str = "sqlite://sweet_delights.db?mode=rwc";
const DEFAULT_PAYMENT_URL: &str = "https://auth.robokassa.ru/Merchant/Index.aspx";
const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com/emails";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Payment gateway (Robokassa) credentials and options.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Shop identifier registered with the provider
    #[serde(default)]
    pub merchant_login: Option<String>,

    /// Secret used to sign outbound payment URLs
    #[serde(default)]
    pub password1: Option<String>,

    /// Secret used to verify result callbacks
    #[serde(default)]
    pub password2: Option<String>,

    /// Adds `IsTest=1` to generated URLs
    #[serde(default)]
    pub test_mode: bool,

    /// Digest used for `SignatureValue`: md5, sha256, sha384 or sha512
    #[serde(default = "default_hash_algorithm")]
    #[validate(custom = "validate_hash_algorithm")]
    pub hash_algorithm: String,

    #[serde(default = "default_payment_url")]
    #[validate(url)]
    pub base_url: String,

    #[serde(default = "default_payment_culture")]
    pub culture: String,

    /// Description shown on the provider's checkout page
    #[serde(default = "default_payment_description")]
    pub description: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            merchant_login: None,
            password1: None,
            password2: None,
            test_mode: false,
            hash_algorithm: default_hash_algorithm(),
            base_url: default_payment_url(),
            culture: default_payment_culture(),
            description: default_payment_description(),
        }
    }
}

/// Transactional email provider settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default = "default_email_api_url")]
    #[validate(url)]
    pub api_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_email_from")]
    pub from: String,

    /// Store owner mailbox receiving order copies
    #[serde(default)]
    pub owner_email: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_email_api_url(),
            api_key: None,
            from: default_email_from(),
            owner_email: None,
        }
    }
}

/// Telegram bot settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat receiving new-order alerts
    #[serde(default)]
    pub owner_chat_id: Option<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: default_telegram_api_url(),
            bot_token: None,
            owner_chat_id: None,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Document store backend: "sql" or "memory"
    #[serde(default = "default_store_backend")]
    #[validate(custom = "validate_store_backend")]
    pub store_backend: String,

    /// Connection URL used by the sql backend
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Secret for session tokens; auth endpoints fail closed without it
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Session token lifetime in seconds
    #[serde(default = "default_jwt_expiration")]
    #[validate(range(min = 300, max = 7776000))]
    pub jwt_expiration: u64,

    /// Currency units spent per loyalty spin
    #[serde(default = "default_spin_threshold")]
    #[validate(range(min = 1))]
    pub spin_threshold: u32,

    /// Lifetime of e-mail verification codes in seconds
    #[serde(default = "default_verification_code_ttl")]
    pub verification_code_ttl_secs: u64,

    /// Timeout for outbound provider calls
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Public storefront URL used in e-mail links
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    #[validate]
    pub payment: PaymentConfig,

    #[serde(default)]
    #[validate]
    pub email: EmailConfig,

    #[serde(default)]
    #[validate]
    pub telegram: TelegramConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the listener.
    pub fn new(host: String, port: u16, environment: String) -> Self {
        Self {
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            store_backend: default_store_backend(),
            database_url: default_database_url(),
            jwt_secret: None,
            jwt_expiration: default_jwt_expiration(),
            spin_threshold: default_spin_threshold(),
            verification_code_ttl_secs: default_verification_code_ttl(),
            http_timeout_secs: default_http_timeout(),
            site_url: default_site_url(),
            cors_allowed_origins: None,
            payment: PaymentConfig::default(),
            email: EmailConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_store_backend() -> String {
    DEFAULT_STORE_BACKEND.to_string()
}
fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}
fn default_jwt_expiration() -> u64 {
    7 * 24 * 3600
}
fn default_spin_threshold() -> u32 {
    1000
}
fn default_verification_code_ttl() -> u64 {
    15 * 60
}
fn default_http_timeout() -> u64 {
    10
}
fn default_site_url() -> String {
    "https://sweetdelights.shop".to_string()
}
fn default_hash_algorithm() -> String {
    "sha256".to_string()
}
fn default_payment_url() -> String {
    DEFAULT_PAYMENT_URL.to_string()
}
fn default_payment_culture() -> String {
    "ru".to_string()
}
fn default_payment_description() -> String {
    "Sweet Delights order".to_string()
}
fn default_email_api_url() -> String {
    DEFAULT_EMAIL_API_URL.to_string()
}
fn default_email_from() -> String {
    "Sweet Delights <orders@sweetdelights.shop>".to_string()
}
fn default_telegram_api_url() -> String {
    DEFAULT_TELEGRAM_API_URL.to_string()
}

/// Validates log level values
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

fn validate_store_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "sql" | "memory" => Ok(()),
        _ => {
            let mut err = ValidationError::new("store_backend");
            err.message = Some("Must be one of: sql, memory".into());
            Err(err)
        }
    }
}

fn validate_hash_algorithm(value: &str) -> Result<(), ValidationError> {
    if value.parse::<crate::services::payment_gateway::HashAlgorithm>().is_ok() {
        Ok(())
    } else {
        let mut err = ValidationError::new("hash_algorithm");
        err.message = Some("Must be one of: md5, sha256, sha384, sha512".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("sweet_delights_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt().with_env_filter(EnvFilter::new(filter_directive));
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*, nested with `__`)
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
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.jwt_secret.is_none() {
        info!("APP__JWT_SECRET is not set; account endpoints will be unavailable");
    }
    if app_config.payment.password2.is_none() {
        info!("APP__PAYMENT__PASSWORD2 is not set; payment callbacks will be rejected");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new("127.0.0.1".into(), 8080, "test".into())
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.spin_threshold, 1000);
        assert_eq!(cfg.payment.hash_algorithm, "sha256");
    }

    #[test]
    fn rejects_unknown_store_backend() {
        let mut cfg = base_config();
        cfg.store_backend = "dynamo".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_hash_algorithm() {
        let mut cfg = base_config();
        cfg.payment.hash_algorithm = "md4".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nested_sections_deserialize_from_layered_sources() {
        let raw = Config::builder()
            .set_default("host", "0.0.0.0")
            .unwrap()
            .set_default("environment", "test")
            .unwrap()
            .set_override("payment.merchant_login", "sweet")
            .unwrap()
            .set_override("payment.test_mode", true)
            .unwrap()
            .set_override("telegram.owner_chat_id", 42i64)
            .unwrap()
            .build()
            .unwrap();

        let cfg: AppConfig = raw.try_deserialize().unwrap();
        assert_eq!(cfg.payment.merchant_login.as_deref(), Some("sweet"));
        assert!(cfg.payment.test_mode);
        assert_eq!(cfg.telegram.owner_chat_id, Some(42));
        assert_eq!(cfg.telegram.api_url, DEFAULT_TELEGRAM_API_URL);
        assert_eq!(cfg.port, DEFAULT_PORT);
    }
}
