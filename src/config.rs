//! Configuration management for the library server

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Relational store settings. Without a URL the server runs on the in-memory store.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

/// Borrow period rules
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LendingConfig {
    pub min_period_days: i64,
    pub max_period_days: i64,
    pub default_period_days: i64,
    pub max_extension_days: i64,
}

/// Response cache settings, TTLs per logical resource family
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub collection_ttl_secs: u64,
    pub item_ttl_secs: u64,
    pub search_ttl_secs: u64,
    pub aggregate_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_per_page: i64,
    pub allowed_per_page: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SeedConfig {
    /// Load the sample catalog into the in-memory store at startup
    pub sample_data: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub lending: LendingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // e.g. LIBRARY__CACHE__ITEM_TTL_SECS=120
            .add_source(
                Environment::with_prefix("LIBRARY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lending = &self.lending;
        if lending.min_period_days < 0
            || lending.min_period_days > lending.default_period_days
            || lending.default_period_days > lending.max_period_days
        {
            return Err(ConfigError::Message(format!(
                "lending periods must satisfy 0 <= min ({}) <= default ({}) <= max ({})",
                lending.min_period_days, lending.default_period_days, lending.max_period_days
            )));
        }
        if lending.max_extension_days < 1 {
            return Err(ConfigError::Message(
                "lending.max_extension_days must be at least 1".to_string(),
            ));
        }

        let cache = &self.cache;
        if cache.collection_ttl_secs <= cache.search_ttl_secs
            || cache.item_ttl_secs <= cache.search_ttl_secs
            || cache.aggregate_ttl_secs > cache.search_ttl_secs
        {
            return Err(ConfigError::Message(
                "cache TTLs must keep collection and item reads above search, and aggregates lowest"
                    .to_string(),
            ));
        }

        let pagination = &self.pagination;
        if !pagination.allowed_per_page.contains(&pagination.default_per_page) {
            return Err(ConfigError::Message(format!(
                "pagination.default_per_page {} is not one of {:?}",
                pagination.default_per_page, pagination.allowed_per_page
            )));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            min_period_days: 7,
            max_period_days: 30,
            default_period_days: 14,
            max_extension_days: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1024,
            collection_ttl_secs: 300,
            item_ttl_secs: 600,
            search_ttl_secs: 60,
            aggregate_ttl_secs: 10,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: 10,
            allowed_per_page: vec![5, 10, 15],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_search_ttl_must_stay_below_collection_ttl() {
        let mut config = AppConfig::default();
        config.cache.search_ttl_secs = 400;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_period_outside_range_is_rejected() {
        let mut config = AppConfig::default();
        config.lending.default_period_days = 45;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_page_size_must_be_allowed() {
        let mut config = AppConfig::default();
        config.pagination.default_per_page = 7;
        assert!(config.validate().is_err());
    }
}
