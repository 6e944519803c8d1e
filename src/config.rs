//! Configuration management for the task board server.
//!
//! Configuration can be set via environment variables (a `.env` file in the
//! working directory is loaded first if present):
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `5000`.
//! - `TASKBOARD_STORE` - Optional. `memory`, `file` or `sqlite`. Defaults to `sqlite`.
//! - `TASKBOARD_DATA_DIR` - Optional. Directory for the file/sqlite stores. Defaults to `./data`.
//! - `TASKBOARD_DB_NAME` - Optional. Database file stem. Defaults to `TaskManagement`.
//! - `CORS_ORIGINS` - Optional. Comma-separated allowed origins. Empty allows any origin.
//! - `TASKBOARD_COMPACT_ON_DELETE` - Optional. Re-rank a category after a delete. Defaults to `false`.

use std::path::PathBuf;
use thiserror::Error;

use crate::board::store::StoreType;
use crate::util::env_var_bool;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Storage backend
    pub store_type: StoreType,

    /// Directory holding the file/sqlite stores
    pub data_dir: PathBuf,

    /// File stem of the database inside `data_dir`
    pub db_name: String,

    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,

    /// Compact the vacated category after every delete
    pub compact_on_delete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            store_type: StoreType::default(),
            data_dir: PathBuf::from("data"),
            db_name: "TaskManagement".to_string(),
            cors_origins: Vec::new(),
            compact_on_delete: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `PORT` or `TASKBOARD_STORE`
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);

        let port = match std::env::var("PORT") {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?,
            Err(_) => defaults.port,
        };

        let store_type = match std::env::var("TASKBOARD_STORE") {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidValue("TASKBOARD_STORE".to_string(), e))?,
            Err(_) => defaults.store_type,
        };

        let data_dir = std::env::var("TASKBOARD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let db_name = std::env::var("TASKBOARD_DB_NAME").unwrap_or(defaults.db_name);

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|value| parse_origins(&value))
            .unwrap_or_default();

        let compact_on_delete = env_var_bool("TASKBOARD_COMPACT_ON_DELETE", false);

        Ok(Self {
            host,
            port,
            store_type,
            data_dir,
            db_name,
            cors_origins,
            compact_on_delete,
        })
    }

    /// Create a config backed by the in-memory store (useful for testing).
    pub fn in_memory() -> Self {
        Self {
            store_type: StoreType::Memory,
            ..Self::default()
        }
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.store_type, StoreType::Sqlite);
        assert_eq!(config.db_name, "TaskManagement");
        assert!(config.cors_origins.is_empty());
        assert!(!config.compact_on_delete);
    }

    #[test]
    fn in_memory_overrides_store_only() {
        let config = Config::in_memory();
        assert_eq!(config.store_type, StoreType::Memory);
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("http://localhost:5173, https://board.example.com ,,"),
            vec!["http://localhost:5173", "https://board.example.com"]
        );
        assert!(parse_origins("  ").is_empty());
    }
}
