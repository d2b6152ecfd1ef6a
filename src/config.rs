use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_UPSTREAM_BASE_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Which persistence backend the service writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local state, lost on restart.
    Memory,
    /// SQLite file at `DATABASE_PATH`.
    Sqlite,
    /// Postgres server at `DATABASE_URL`.
    Postgres,
    /// Hosted PostgREST endpoint (Supabase) at `SUPABASE_URL`.
    Supabase,
}

impl StorageBackend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgresql",
            Self::Supabase => "supabase",
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Web Server
    pub web_host: String,
    pub web_port: u16,
    pub static_dir: PathBuf,

    // Storage
    pub storage_backend: StorageBackend,
    pub database_path: PathBuf,
    pub database_url: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub request_log_retention: usize,

    // Admin
    pub admin_key: Option<String>,

    // Upstream
    pub upstream_base_url: String,
    pub fetch_timeout: Duration,

    // Stats
    pub popular_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = optional_env("DATABASE_URL");
        let supabase_url = optional_env("SUPABASE_URL");

        let storage_backend = match optional_env("STORAGE_BACKEND") {
            Some(value) => parse_storage_backend(&value)?,
            None => infer_storage_backend(database_url.as_deref(), supabase_url.as_deref()),
        };

        // PORT is what most PaaS hosts inject
        let web_port = match optional_env("WEB_PORT") {
            Some(_) => parse_env_u16("WEB_PORT", 3000)?,
            None => parse_env_u16("PORT", 3000)?,
        };

        Ok(Self {
            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port,
            static_dir: PathBuf::from(env_or_default("STATIC_DIR", "./static")),

            // Storage
            storage_backend,
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/videos.sqlite")),
            database_url,
            supabase_url,
            supabase_key: optional_env("SUPABASE_KEY"),
            request_log_retention: parse_env_usize("REQUEST_LOG_RETENTION", 1000)?,

            // Admin
            admin_key: optional_env("ADMIN_KEY"),

            // Upstream
            upstream_base_url: env_or_default("UPSTREAM_BASE_URL", DEFAULT_UPSTREAM_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            fetch_timeout: Duration::from_secs(parse_env_u64("FETCH_TIMEOUT_SECS", 15)?),

            // Stats
            popular_limit: parse_env_usize("POPULAR_LIMIT", 10)?,
        })
    }

    /// Configuration with in-memory storage and defaults, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            static_dir: PathBuf::from("./static"),
            storage_backend: StorageBackend::Memory,
            database_path: PathBuf::from("./data/test.sqlite"),
            database_url: None,
            supabase_url: None,
            supabase_key: None,
            request_log_retention: 1000,
            admin_key: Some("test-admin-key".to_string()),
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            fetch_timeout: Duration::from_secs(15),
            popular_limit: 10,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_log_retention == 0 {
            return Err(ConfigError::InvalidValue {
                name: "REQUEST_LOG_RETENTION".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "FETCH_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if url::Url::parse(&self.upstream_base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "UPSTREAM_BASE_URL".to_string(),
                message: format!("'{}' is not an absolute URL", self.upstream_base_url),
            });
        }
        match self.storage_backend {
            StorageBackend::Postgres if self.database_url.is_none() => {
                return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
            }
            StorageBackend::Supabase if self.supabase_url.is_none() => {
                return Err(ConfigError::MissingEnvVar("SUPABASE_URL".to_string()));
            }
            StorageBackend::Supabase if self.supabase_key.is_none() => {
                return Err(ConfigError::MissingEnvVar("SUPABASE_KEY".to_string()));
            }
            _ => {}
        }
        Ok(())
    }
}

fn infer_storage_backend(database_url: Option<&str>, supabase_url: Option<&str>) -> StorageBackend {
    if let Some(url) = database_url {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return StorageBackend::Postgres;
        }
    }
    if supabase_url.is_some() {
        return StorageBackend::Supabase;
    }
    StorageBackend::Memory
}

fn parse_storage_backend(value: &str) -> Result<StorageBackend, ConfigError> {
    match value.to_lowercase().as_str() {
        "memory" => Ok(StorageBackend::Memory),
        "sqlite" => Ok(StorageBackend::Sqlite),
        "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
        "supabase" => Ok(StorageBackend::Supabase),
        _ => Err(ConfigError::InvalidValue {
            name: "STORAGE_BACKEND".to_string(),
            message: format!("must be 'memory', 'sqlite', 'postgres' or 'supabase', got '{value}'"),
        }),
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
