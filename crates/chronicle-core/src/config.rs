//! Repository configuration.

use std::env;

use thiserror::Error;

/// Default number of events per read request and per write segment.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Environment variable overriding the read page size.
pub const READ_PAGE_SIZE_VAR: &str = "CHRONICLE_READ_PAGE_SIZE";
/// Environment variable overriding the write page size.
pub const WRITE_PAGE_SIZE_VAR: &str = "CHRONICLE_WRITE_PAGE_SIZE";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// A setting has a value that cannot be used.
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        /// The setting name.
        key: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Paging used by the repository when reading and writing streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Maximum events requested per read.
    pub read_page_size: usize,
    /// Maximum events per append, or per transaction write when a save spans
    /// several pages.
    pub write_page_size: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            read_page_size: DEFAULT_PAGE_SIZE,
            write_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RepositoryConfig {
    /// Reads page sizes from the environment, falling back to the defaults
    /// for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`RepositoryConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            read_page_size: page_size(READ_PAGE_SIZE_VAR, lookup(READ_PAGE_SIZE_VAR))?
                .unwrap_or(defaults.read_page_size),
            write_page_size: page_size(WRITE_PAGE_SIZE_VAR, lookup(WRITE_PAGE_SIZE_VAR))?
                .unwrap_or(defaults.write_page_size),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that both page sizes are usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a zero page size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            (READ_PAGE_SIZE_VAR, self.read_page_size),
            (WRITE_PAGE_SIZE_VAR, self.write_page_size),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                    reason: "page size must be at least 1".into(),
                });
            }
        }
        Ok(())
    }
}

fn page_size(key: &'static str, raw: Option<String>) -> Result<Option<usize>, ConfigError> {
    raw.map(|value| {
        value.trim().parse().map_err(|e| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason: format!("{e}"),
        })
    })
    .transpose()
}
