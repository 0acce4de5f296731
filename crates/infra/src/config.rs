//! Configuration loading and store wiring.
//!
//! Environment variables:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `STOCK_MAX_COMMIT_ATTEMPTS` | `5` | Commit attempts per operation before giving up |
//! | `USE_PERSISTENT_STORES` | `false` | `true` selects the Postgres store |
//! | `DATABASE_URL` | none | Required when `USE_PERSISTENT_STORES=true` |
//! | `STOCK_DB_MAX_CONNECTIONS` | `10` | Postgres pool size |

use std::sync::Arc;

use thiserror::Error;

use crate::store::{InMemoryStockStore, PostgresStockStore, StockStore, StoreError};

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Ledger engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Commit attempts per operation; a version conflict on the last one is fatal.
    pub max_commit_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    /// Clamped to at least one attempt.
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockConfig {
    pub engine: EngineConfig,
    pub backend: StoreBackend,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            backend: StoreBackend::InMemory,
        }
    }
}

impl StockConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StockConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_commit_attempts = match lookup("STOCK_MAX_COMMIT_ATTEMPTS") {
            Some(raw) => parse_positive("STOCK_MAX_COMMIT_ATTEMPTS", &raw)?,
            None => DEFAULT_MAX_COMMIT_ATTEMPTS,
        };

        let use_persistent = match lookup("USE_PERSISTENT_STORES") {
            Some(raw) => raw.trim().parse::<bool>().map_err(|_| ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                expected: "true or false",
                value: raw.clone(),
            })?,
            None => false,
        };

        let backend = if use_persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections = match lookup("STOCK_DB_MAX_CONNECTIONS") {
                Some(raw) => parse_positive("STOCK_DB_MAX_CONNECTIONS", &raw)?,
                None => DEFAULT_MAX_CONNECTIONS,
            };
            StoreBackend::Postgres {
                database_url,
                max_connections,
            }
        } else {
            StoreBackend::InMemory
        };

        Ok(Self {
            engine: EngineConfig {
                max_commit_attempts,
            },
            backend,
        })
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "an integer >= 1",
            value: raw.to_string(),
        }),
    }
}

/// Build the store selected by `config.backend`.
pub async fn open_store(config: &StockConfig) -> Result<Arc<dyn StockStore>, StoreError> {
    match &config.backend {
        StoreBackend::InMemory => {
            tracing::info!(backend = "in_memory", "opening stock store");
            Ok(Arc::new(InMemoryStockStore::new()))
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            tracing::info!(backend = "postgres", max_connections, "opening stock store");
            let store = PostgresStockStore::connect(database_url, *max_connections).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LedgerStore;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_in_memory_with_five_attempts() {
        let config = StockConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StockConfig::default());
        assert_eq!(config.engine.max_commit_attempts, 5);
    }

    #[test]
    fn persistent_stores_require_database_url() {
        let err = StockConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));

        let config = StockConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/stock"),
            ("STOCK_MAX_COMMIT_ATTEMPTS", "8"),
        ]))
        .unwrap();
        assert_eq!(config.engine.max_commit_attempts, 8);
        assert_eq!(
            config.backend,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/stock".into(),
                max_connections: DEFAULT_MAX_CONNECTIONS,
            }
        );
    }

    #[test]
    fn rejects_zero_and_garbage() {
        for raw in ["0", "-1", "many"] {
            let err = StockConfig::from_lookup(lookup(&[("STOCK_MAX_COMMIT_ATTEMPTS", raw)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "STOCK_MAX_COMMIT_ATTEMPTS", .. }));
        }
        let err = StockConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "yes")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "USE_PERSISTENT_STORES", .. }));
    }

    #[test]
    fn attempts_never_drop_below_one() {
        assert_eq!(EngineConfig::default().with_max_commit_attempts(0).max_commit_attempts, 1);
    }

    #[tokio::test]
    async fn opens_in_memory_store() {
        let store = open_store(&StockConfig::default()).await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
