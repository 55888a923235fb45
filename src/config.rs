use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::money::Currency;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_BASE_PATH: &str = "/api/v1/apps/basket";
const DEFAULT_CORE_URL: &str = "http://localhost:8080";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Storage backend: "database" (sea-orm) or "memory"
    #[serde(default = "default_storage_backend")]
    #[validate(custom = "validate_storage_backend")]
    pub storage_backend: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Public origin of the platform; gateway and callback URLs are built from it
    #[serde(default = "default_core_url")]
    #[validate(custom = "crate::common::validate_url")]
    pub core_url: String,

    /// Path prefix this service is mounted under
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Currency assigned to baskets and payments that do not name one
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub default_currency: String,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u64,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    #[validate(range(min = 1))]
    pub api_max_page_size: u64,

    /// Seconds a payment stays startable after creation
    #[serde(default = "default_payment_duration_secs")]
    #[validate(range(min = 1, max = 31_536_000))]
    pub payment_duration_secs: i64,

    /// Accounting service base URL (defaults to `{core_url}/api/accounting/v1`)
    #[serde(default)]
    pub accounting_url: Option<String>,

    /// Enrollment service endpoint (defaults to `{core_url}/api/saas/v1/enrollments`)
    #[serde(default)]
    pub enrollment_url: Option<String>,

    /// API key sent to platform collaborators
    #[serde(default)]
    pub service_api_key: Option<String>,

    /// Timeout for outbound HTTP calls
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Secret for signing item webhook payloads
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Delivery attempts per item webhook
    #[serde(default = "default_webhook_max_retries")]
    pub webhook_max_retries: u32,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, core_url: String, environment: String) -> Self {
        Self {
            database_url,
            storage_backend: default_storage_backend(),
            auto_migrate: false,
            host: "0.0.0.0".to_string(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            core_url,
            base_path: default_base_path(),
            default_currency: default_currency(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            payment_duration_secs: default_payment_duration_secs(),
            accounting_url: None,
            enrollment_url: None,
            service_api_key: None,
            http_timeout_secs: default_http_timeout_secs(),
            webhook_secret: None,
            webhook_max_retries: default_webhook_max_retries(),
            event_channel_capacity: default_event_channel_capacity(),
            cors_allowed_origins: None,
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn uses_memory_store(&self) -> bool {
        self.storage_backend.eq_ignore_ascii_case("memory")
    }

    /// Parsed default currency; falls back to IRR if validation was bypassed.
    pub fn currency(&self) -> Currency {
        Currency::from_str(&self.default_currency).unwrap_or(Currency::Irr)
    }

    /// `core_url` + `base_path` without a trailing slash
    pub fn public_base_url(&self) -> String {
        format!(
            "{}{}",
            self.core_url.trim_end_matches('/'),
            self.base_path.trim_end_matches('/')
        )
    }

    pub fn accounting_base_url(&self) -> String {
        self.accounting_url.clone().unwrap_or_else(|| {
            format!("{}/api/accounting/v1", self.core_url.trim_end_matches('/'))
        })
    }

    pub fn enrollment_endpoint(&self) -> String {
        self.enrollment_url.clone().unwrap_or_else(|| {
            format!(
                "{}/api/saas/v1/enrollments",
                self.core_url.trim_end_matches('/')
            )
        })
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
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

fn default_storage_backend() -> String {
    "database".to_string()
}

fn default_core_url() -> String {
    DEFAULT_CORE_URL.to_string()
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_currency() -> String {
    "IRR".to_string()
}

fn default_api_page_size() -> u64 {
    10
}

fn default_api_max_page_size() -> u64 {
    100
}

fn default_payment_duration_secs() -> i64 {
    3600
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_webhook_max_retries() -> u32 {
    3
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_storage_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "database" | "memory" => Ok(()),
        _ => {
            let mut err = ValidationError::new("storage_backend");
            err.message = Some("Must be one of: database, memory".into());
            Err(err)
        }
    }
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

fn validate_currency(code: &str) -> Result<(), ValidationError> {
    Currency::from_str(code).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("default_currency");
        err.message = Some(format!("Unsupported currency: {}", code).into());
        err
    })
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("basket_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
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
    load_config_from(Path::new(CONFIG_DIR))
}

pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://basket.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
