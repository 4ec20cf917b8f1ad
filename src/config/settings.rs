//! Process settings read from the environment (and `.env` when present).

use crate::error::ConfigError;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub database_url: String,
    /// Path of the entity model JSON.
    pub model_path: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    /// Applied as `statement_timeout` on each pooled connection; `None` leaves the server default.
    pub db_statement_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/crud".into(),
            model_path: "demos/model.json".into(),
            bind_addr: "127.0.0.1:3000".into(),
            db_max_connections: 5,
            db_statement_timeout: None,
        }
    }
}

impl Settings {
    /// Loads `.env` (if any), then reads `DATABASE_URL`, `MODEL_PATH`, `BIND_ADDR`,
    /// `DB_MAX_CONNECTIONS` and `DB_STATEMENT_TIMEOUT_MS` over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        if let Some(v) = lookup("DATABASE_URL") {
            settings.database_url = v;
        }
        if let Some(v) = lookup("MODEL_PATH") {
            settings.model_path = v;
        }
        if let Some(v) = lookup("BIND_ADDR") {
            settings.bind_addr = v;
        }
        if let Some(v) = lookup("DB_MAX_CONNECTIONS") {
            settings.db_max_connections = parse_number("DB_MAX_CONNECTIONS", &v)?;
            if settings.db_max_connections == 0 {
                return Err(ConfigError::Validation("DB_MAX_CONNECTIONS must be > 0".into()));
            }
        }
        if let Some(v) = lookup("DB_STATEMENT_TIMEOUT_MS") {
            let ms: u64 = parse_number("DB_STATEMENT_TIMEOUT_MS", &v)?;
            settings.db_statement_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(settings)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Load(format!("{} must be a number, got '{}'", key, raw)))
}
