use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATABASE_URL: &str = "sqlite://pantry.db?mode=rwc";
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (sqlite:// or postgres://)
    #[validate(custom = "validate_database_url")]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port (1024-65535)
    #[serde(default = "default_port")]
    #[validate(range(min = 1024, max = 65535))]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to bootstrap the schema on startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    /// CORS: the single front-end origin allowed to call the API
    #[serde(default)]
    pub cors_allowed_origin: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout in seconds
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// DB idle timeout in seconds
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// DB acquire timeout in seconds
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Per-request deadline applied by the HTTP stack
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Trailing window used by reports when no dates are supplied
    #[serde(default = "default_report_window_days")]
    #[validate(range(min = 1, max = 366))]
    pub report_window_days: i64,

    /// Fraction of the last restock below which an item counts as low stock
    #[serde(default = "default_low_stock_threshold")]
    #[validate(custom = "validate_low_stock_threshold")]
    pub low_stock_threshold: f64,

    /// External forecasting command; the built-in trend model is used when unset
    #[serde(default)]
    pub forecast_command: Option<String>,

    #[serde(default = "default_forecast_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub forecast_timeout_secs: u64,

    #[serde(default = "default_forecast_limit")]
    #[validate(range(min = 1, max = 10000))]
    pub forecast_limit: usize,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1, max = 1000000))]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Builds a configuration from explicit values, leaving every tunable at its default.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origin: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            report_window_days: default_report_window_days(),
            low_stock_threshold: default_low_stock_threshold(),
            forecast_command: None,
            forecast_timeout_secs: default_forecast_timeout_secs(),
            forecast_limit: default_forecast_limit(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn forecast_timeout(&self) -> Duration {
        Duration::from_secs(self.forecast_timeout_secs)
    }

    pub fn has_cors_allowed_origin(&self) -> bool {
        self.cors_allowed_origin
            .as_deref()
            .map(|o| !o.trim().is_empty())
            .unwrap_or(false)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && !self.has_cors_allowed_origin() {
            let mut err = ValidationError::new("cors_allowed_origin_required");
            err.message =
                Some("Set APP__CORS_ALLOWED_ORIGIN for non-development environments".into());
            errors.add("cors_allowed_origin", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_pool_bounds");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gets log level reference
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

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    16
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

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_report_window_days() -> i64 {
    7
}

fn default_low_stock_threshold() -> f64 {
    1.0
}

fn default_forecast_timeout_secs() -> u64 {
    30
}

fn default_forecast_limit() -> usize {
    100
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_database_url(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("sqlite:") || url.starts_with("postgres://") || url.starts_with("postgresql://")
    {
        return Ok(());
    }
    let mut err = ValidationError::new("database_url_scheme");
    err.message = Some("database_url must use the sqlite: or postgres:// scheme".into());
    Err(err)
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some("log_level must be one of trace, debug, info, warn, error".into());
            Err(err)
        }
    }
}

fn validate_low_stock_threshold(threshold: f64) -> Result<(), ValidationError> {
    if threshold.is_finite() && threshold > 0.0 && threshold <= 10.0 {
        return Ok(());
    }
    let mut err = ValidationError::new("low_stock_threshold_range");
    err.message = Some("low_stock_threshold must be greater than 0 and at most 10".into());
    Err(err)
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("pantry_api={},tower_http=debug", level);
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

/// Same as [`load_config`] with an explicit configuration directory.
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

    let dir = config_dir.display().to_string();
    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", dir, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File as StdFile;
    use std::io::Write;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new(
            DEFAULT_DATABASE_URL.to_string(),
            "127.0.0.1".to_string(),
            8080,
            "development".to_string(),
        )
    }

    fn write_config(dir: &TempDir, filename: &str, content: &str) {
        let mut file = StdFile::create(dir.path().join(filename)).unwrap();
        writeln!(file, "{}", content).unwrap();
    }

    #[test]
    fn defaults_validate() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert!(config.validate_additional_constraints().is_ok());
        assert_eq!(config.report_window_days, 7);
        assert_eq!(config.low_stock_threshold, 1.0);
        assert_eq!(config.forecast_limit, 100);
    }

    #[test]
    fn production_requires_cors_origin() {
        let mut config = base_config();
        config.environment = "production".into();
        let err = config.validate_additional_constraints().unwrap_err();
        assert!(err.field_errors().contains_key("cors_allowed_origin"));

        config.cors_allowed_origin = Some("https://pantry.example.org".into());
        assert!(config.validate_additional_constraints().is_ok());
    }

    #[test]
    fn low_stock_threshold_must_be_positive_and_bounded() {
        assert!(validate_low_stock_threshold(0.5).is_ok());
        assert!(validate_low_stock_threshold(10.0).is_ok());
        assert!(validate_low_stock_threshold(0.0).is_err());
        assert!(validate_low_stock_threshold(-1.0).is_err());
        assert!(validate_low_stock_threshold(10.5).is_err());
        assert!(validate_low_stock_threshold(f64::NAN).is_err());
    }

    #[test]
    fn rejects_unknown_database_scheme() {
        let mut config = base_config();
        config.database_url = "mysql://localhost/pantry".into();
        let err = config.validate().unwrap_err();
        assert!(err.field_errors().contains_key("database_url"));
    }

    #[test]
    fn loads_file_layers() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
                database_url = "sqlite::memory:"
                host = "127.0.0.1"
                port = 9090
                environment = "development"
                log_level = "debug"
                low_stock_threshold = 0.5
            "#,
        );

        let config = load_config_from(dir.path()).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.port, 9090);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.low_stock_threshold, 0.5);
        assert!(config.auto_migrate);
    }

    #[test]
    fn invalid_file_fails_validation() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
                database_url = "sqlite::memory:"
                host = "127.0.0.1"
                port = 8080
                environment = "development"
                log_level = "loud"
                low_stock_threshold = 0.0
            "#,
        );

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
        if let Err(AppConfigError::Validation(errors)) = result {
            assert!(errors.field_errors().contains_key("log_level"));
            assert!(errors.field_errors().contains_key("low_stock_threshold"));
        }
    }
}
