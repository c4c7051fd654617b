//! Connection settings for the PostgreSQL event store.

use std::env;

use chronicle_core::config::ConfigError;

/// Environment variable holding the PostgreSQL connection string.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Environment variable overriding the pool size.
pub const MAX_CONNECTIONS_VAR: &str = "CHRONICLE_MAX_CONNECTIONS";
/// Pool size used when none is configured.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Settings for [`crate::pg_event_store::PgEventStore::connect`].
#[derive(Clone, PartialEq, Eq)]
pub struct PgStoreConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

impl PgStoreConfig {
    /// Builds a configuration for `database_url` with the default pool size.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Reads `DATABASE_URL` and `CHRONICLE_MAX_CONNECTIONS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `DATABASE_URL` is unset and
    /// `ConfigError::Invalid` if the pool size is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`PgStoreConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(DATABASE_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;
        let max_connections = match lookup(MAX_CONNECTIONS_VAR) {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        key: MAX_CONNECTIONS_VAR,
                        value: raw,
                        reason: "pool needs at least one connection".into(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: MAX_CONNECTIONS_VAR,
                        reason: e.to_string(),
                        value: raw,
                    });
                }
            },
        };
        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

// Connection strings carry credentials.
impl std::fmt::Debug for PgStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStoreConfig")
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}
