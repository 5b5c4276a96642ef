//! Configuration for DAO connection pools.
//!
//! Each DAO instance owns one private pool, sized by [`PoolOptions`] and
//! pointed at a store by [`StoreConfig`].

use std::path::PathBuf;
use std::time::Duration;

// Pool configuration defaults
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

/// Connection pool sizing and timeout options.
#[derive(Debug, Clone, Default)]
pub struct PoolOptions {
    /// Minimum connections kept in the pool (default: 1)
    pub min_connections: Option<u32>,
    /// Maximum connections allowed in the pool (default: 10)
    pub max_connections: Option<u32>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
}

impl PoolOptions {
    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get max_connections with default value.
    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Configuration for a DAO's private store connection.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the target store (database file; created if missing).
    pub store_path: PathBuf,
    /// Pool sizing options.
    pub pool: PoolOptions,
}

impl StoreConfig {
    /// Create a config for the given store path with default pool options.
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            pool: PoolOptions::default(),
        }
    }

    /// Create a config with explicit pool bounds.
    pub fn with_pool_bounds(
        store_path: impl Into<PathBuf>,
        min_connections: u32,
        max_connections: u32,
    ) -> Self {
        Self {
            store_path: store_path.into(),
            pool: PoolOptions {
                min_connections: Some(min_connections),
                max_connections: Some(max_connections),
                acquire_timeout_secs: None,
            },
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate()
    }
}
