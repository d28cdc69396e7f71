//! Environment-driven configuration structures shared by all binaries.

use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_IMPORT_CONCURRENCY: usize = 4;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// API-specific configuration (HTTP bind + shared database + ledger source
/// for on-demand refreshes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    ledger_source_url: String,
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    import_concurrency: usize,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            ledger_source_url: get_required_var("LEDGER_SOURCE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            import_concurrency: get_positive_var(
                "IMPORT_CONCURRENCY",
                DEFAULT_IMPORT_CONCURRENCY as u64,
            )? as usize,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn ledger_source_url(&self) -> &str {
        &self.ledger_source_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn import_concurrency(&self) -> usize {
        self.import_concurrency
    }
}

/// Configuration for the polling refresh worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    database_url: String,
    ledger_source_url: String,
    import_concurrency: usize,
    refresh_interval: Duration,
}

impl WorkerConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let database_url = get_required_var("DATABASE_URL")?;
        let ledger_source_url = get_required_var("LEDGER_SOURCE_URL")?;
        let import_concurrency =
            get_positive_var("IMPORT_CONCURRENCY", DEFAULT_IMPORT_CONCURRENCY as u64)? as usize;
        let refresh_interval = Duration::from_secs(get_positive_var(
            "REFRESH_INTERVAL_SECS",
            DEFAULT_REFRESH_INTERVAL_SECS,
        )?);

        Ok(Self {
            database_url,
            ledger_source_url,
            import_concurrency,
            refresh_interval,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn ledger_source_url(&self) -> &str {
        &self.ledger_source_url
    }

    pub fn import_concurrency(&self) -> usize {
        self.import_concurrency
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_positive_var(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = get_optional_var(key) else {
        return Ok(default);
    };
    let value: u64 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })?;
    if value == 0 {
        return Err(ConfigError::NotPositive { key });
    }
    Ok(value)
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("TXSYNC_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be greater than zero")]
    NotPositive { key: &'static str },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
