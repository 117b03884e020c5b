//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup. On Cloud Run they are injected as
//! environment variables through secret bindings.

use crate::models::{ActiveWindow, MonitoringConfig, RecoveryBands};
use chrono::NaiveTime;
use std::env;
use std::str::FromStr;

/// Which `Store` implementation backs persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

/// WHOOP developer platform settings.
#[derive(Debug, Clone)]
pub struct WhoopConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Base URL for the metrics API (without the `/v2` suffix).
    pub api_url: String,
    pub oauth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub whoop: WhoopConfig,
    /// The single user this bot serves.
    pub owner_user_id: u64,
    /// Server port
    pub port: u16,
    pub gcp_project_id: String,
    pub gcp_region: String,
    pub storage_backend: StorageBackend,

    // --- Secrets ---
    /// JWT signing key for API tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
    /// Telegram bot token; notifications are only logged when absent
    pub telegram_bot_token: Option<String>,

    // --- Scheduling ---
    /// Defaults applied when no monitoring config is stored yet
    pub monitoring_defaults: MonitoringConfig,
    pub recovery_bands: RecoveryBands,
    pub poll_interval_minutes: u32,
    /// Local time of the daily metrics pull
    pub daily_refresh_at: NaiveTime,
}

pub const DEFAULT_WHOOP_API_URL: &str = "https://api.prod.whoop.com/developer";
pub const DEFAULT_WHOOP_OAUTH_URL: &str = "https://api.prod.whoop.com/oauth/oauth2/auth";
pub const DEFAULT_WHOOP_TOKEN_URL: &str = "https://api.prod.whoop.com/oauth/oauth2/token";
pub const DEFAULT_SCOPES: &str = "read:recovery read:cycles read:sleep read:workout read:profile offline";

impl Config {
    /// Offline config for tests.
    pub fn test_default() -> Self {
        Self {
            whoop: WhoopConfig {
                client_id: "test_client_id".to_string(),
                client_secret: "test_secret".to_string(),
                redirect_uri: "http://localhost:8080/auth/whoop/callback".to_string(),
                api_url: DEFAULT_WHOOP_API_URL.to_string(),
                oauth_url: DEFAULT_WHOOP_OAUTH_URL.to_string(),
                token_url: DEFAULT_WHOOP_TOKEN_URL.to_string(),
                scopes: split_scopes(DEFAULT_SCOPES),
            },
            owner_user_id: 42,
            port: 8080,
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            storage_backend: StorageBackend::Memory,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            telegram_bot_token: None,
            monitoring_defaults: MonitoringConfig::default(),
            recovery_bands: RecoveryBands::default(),
            poll_interval_minutes: 30,
            daily_refresh_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
        }
    }

    /// Point every WHOOP URL at a single base (mock servers in tests).
    pub fn with_whoop_base_url(mut self, base: &str) -> Self {
        self.whoop.api_url = base.to_string();
        self.whoop.oauth_url = format!("{}/oauth/oauth2/auth", base);
        self.whoop.token_url = format!("{}/oauth/oauth2/token", base);
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let monitoring_defaults = MonitoringConfig {
            enabled: parse_or("MONITOR_ENABLED", true)?,
            threshold: parse_or("MONITOR_THRESHOLD", crate::models::monitoring::DEFAULT_THRESHOLD)?,
            cooldown_minutes: parse_or(
                "MONITOR_COOLDOWN_MINUTES",
                crate::models::monitoring::DEFAULT_COOLDOWN_MINUTES,
            )?,
            active_window: ActiveWindow::parse(
                &env_or("MONITOR_START", "08:00"),
                &env_or("MONITOR_END", "00:00"),
            )
            .map_err(|e| ConfigError::Invalid("MONITOR_START/MONITOR_END", e.to_string()))?,
        };
        monitoring_defaults
            .validate()
            .map_err(|e| ConfigError::Invalid("MONITOR_THRESHOLD", e.to_string()))?;

        let recovery_bands = RecoveryBands {
            low: parse_or("RECOVERY_LOW", 50.0)?,
            high: parse_or("RECOVERY_HIGH", 70.0)?,
        };
        recovery_bands
            .validate()
            .map_err(|e| ConfigError::Invalid("RECOVERY_LOW/RECOVERY_HIGH", e.to_string()))?;

        let daily_refresh_at = crate::models::monitoring::parse_hhmm(&env_or(
            "DAILY_REFRESH_AT",
            "22:00",
        ))
        .map_err(|e| ConfigError::Invalid("DAILY_REFRESH_AT", e.to_string()))?;

        let poll_interval_minutes: u32 = parse_or("MONITOR_INTERVAL_MINUTES", 30)?;
        if poll_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "MONITOR_INTERVAL_MINUTES",
                "must be at least 1".to_string(),
            ));
        }

        let storage_backend = match env_or("STORAGE_BACKEND", "firestore").as_str() {
            "firestore" => StorageBackend::Firestore,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Invalid(
                    "STORAGE_BACKEND",
                    format!("unknown backend '{}'", other),
                ))
            }
        };

        Ok(Self {
            whoop: WhoopConfig {
                client_id: required("WHOOP_CLIENT_ID")?,
                client_secret: required("WHOOP_CLIENT_SECRET")?,
                redirect_uri: env_or(
                    "WHOOP_REDIRECT_URI",
                    "http://localhost:8080/auth/whoop/callback",
                ),
                api_url: env_or("WHOOP_API_URL", DEFAULT_WHOOP_API_URL),
                oauth_url: env_or("WHOOP_OAUTH_URL", DEFAULT_WHOOP_OAUTH_URL),
                token_url: env_or("WHOOP_TOKEN_URL", DEFAULT_WHOOP_TOKEN_URL),
                scopes: split_scopes(&env_or("WHOOP_SCOPES", DEFAULT_SCOPES)),
            },
            owner_user_id: required("OWNER_USER_ID")?
                .parse()
                .map_err(|_| ConfigError::Invalid("OWNER_USER_ID", "not a number".to_string()))?,
            port: parse_or("PORT", 8080)?,
            gcp_project_id: env_or("GCP_PROJECT_ID", "local-dev"),
            gcp_region: env_or("GCP_REGION", "us-west1"),
            storage_backend,
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            monitoring_defaults,
            recovery_bands,
            poll_interval_minutes,
            daily_refresh_at,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, format!("cannot parse '{}'", raw))),
        Err(_) => Ok(default),
    }
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
