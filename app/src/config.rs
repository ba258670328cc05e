// ==============================================================================
// config.rs - Pipeline configuration
// ==============================================================================
// Description: Explicit configuration objects for batching, store access and
//              relay transport, loaded from the environment
// Author: Matt Barham
// Created: 2026-10-04
// Modified: 2026-10-15
// Version: 1.0.0
// ==============================================================================

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_STORE_SERVICE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Batching / concurrency settings for one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Records per chunk
    pub chunk_size: NonZeroUsize,
    /// Maximum chunk deliveries in flight
    pub max_concurrency: NonZeroUsize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            max_concurrency: NonZeroUsize::new(DEFAULT_MAX_CONCURRENCY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl PipelineConfig {
    pub fn new(chunk_size: usize, max_concurrency: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            chunk_size: non_zero("VARIANT_CHUNK_SIZE", chunk_size)?,
            max_concurrency: non_zero("VARIANT_MAX_CONCURRENCY", max_concurrency)?,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(
            parse_or(&lookup, "VARIANT_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            parse_or(&lookup, "VARIANT_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?,
        )
    }
}

/// Postgres connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// `DATABASE_URL`, or the contents of the file named by `DATABASE_URL_FILE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = if let Some(url) = lookup("DATABASE_URL") {
            url
        } else if let Some(file_path) = lookup("DATABASE_URL_FILE") {
            std::fs::read_to_string(&file_path)
                .map_err(|source| ConfigError::Io {
                    name: "DATABASE_URL_FILE",
                    source,
                })?
                .trim()
                .to_string()
        } else {
            return Err(ConfigError::Missing("DATABASE_URL or DATABASE_URL_FILE"));
        };

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
        })
    }
}

/// Downstream store service used in relay mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STORE_SERVICE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RelayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("STORE_SERVICE_URL")
            .unwrap_or_else(|| DEFAULT_STORE_SERVICE_URL.to_string());
        let timeout_secs = parse_or(
            &lookup,
            "STORE_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn non_zero(name: &'static str, value: usize) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: "must be at least 1".to_string(),
    })
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.chunk_size.get(), 1000);
        assert_eq!(config.max_concurrency.get(), 16);
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_pipeline_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("VARIANT_CHUNK_SIZE", "50"),
            ("VARIANT_MAX_CONCURRENCY", " 4 "),
        ]))
        .unwrap();
        assert_eq!(config.chunk_size.get(), 50);
        assert_eq!(config.max_concurrency.get(), 4);
    }

    #[test]
    fn test_pipeline_rejects_zero_and_garbage() {
        assert!(PipelineConfig::new(0, 4).is_err());
        assert!(PipelineConfig::new(200, 0).is_err());
        let err = PipelineConfig::from_lookup(lookup_from(&[("VARIANT_CHUNK_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("VARIANT_CHUNK_SIZE"));
    }

    #[test]
    fn test_store_config_from_url_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "postgres://ingest@localhost/variants").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config =
            StoreConfig::from_lookup(lookup_from(&[("DATABASE_URL_FILE", path.as_str())])).unwrap();
        assert_eq!(config.database_url, "postgres://ingest@localhost/variants");
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn test_store_config_missing() {
        let err = StoreConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_relay_config() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("STORE_SERVICE_URL", "http://store:3000"),
            ("STORE_REQUEST_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "http://store:3000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
