//! Service configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables. Environment variables follow the
//! `LIFELINE__SECTION__KEY` convention, e.g. `LIFELINE__STORE__BACKEND=sled`.
//!
//! # Example
//!
//! ```toml
//! [store]
//! backend = "sled"
//! path = "/var/lib/lifeline"
//!
//! [propagation]
//! header_name = "x-request-id"
//!
//! [query]
//! default_limit = 100
//! max_limit = 1000
//!
//! [server]
//! listen = "0.0.0.0:8080"
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "LIFELINE";

/// Separator between prefix, section and key
pub const ENV_SEPARATOR: &str = "__";

/// Default header carrying the request identifier
pub const DEFAULT_HEADER_NAME: &str = "x-request-id";

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which storage adapter to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sled,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sled" => Ok(StoreBackend::Sled),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory for on-disk backends
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Header carrying the identifier on inbound and outbound calls
    pub header_name: String,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size when the caller gives none
    pub default_limit: usize,
    /// Upper bound on any requested page size
    pub max_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl QueryConfig {
    /// Resolve a caller-supplied limit against the configured bounds.
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Complete Lifeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifelineConfig {
    pub store: StoreConfig,
    pub propagation: PropagationConfig,
    pub query: QueryConfig,
    pub server: ServerConfig,
}

impl LifelineConfig {
    /// Load defaults, the optional file, then the process environment.
    ///
    /// The result is not validated; callers layer their own overrides on
    /// top and call [`validate`](Self::validate) last.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Parse a TOML file. Missing sections take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `LIFELINE__SECTION__KEY` overrides from `vars`.
    ///
    /// Variables outside the prefix are ignored; unknown keys under the
    /// prefix are rejected so typos do not pass silently.
    pub fn apply_env<I>(&mut self, vars: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}{}", ENV_PREFIX, ENV_SEPARATOR);
        for (name, value) in vars {
            let Some(rest) = name.to_uppercase().strip_prefix(&prefix).map(str::to_string) else {
                continue;
            };
            let key = rest.replace(ENV_SEPARATOR, ".").to_lowercase();
            self.set(&key, &value)?;
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        match key {
            "store.backend" => self.store.backend = value.parse().map_err(invalid)?,
            "store.path" => self.store.path = Some(PathBuf::from(value)),
            "propagation.header_name" => self.propagation.header_name = value.to_string(),
            "query.default_limit" => {
                self.query.default_limit = value.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            "query.max_limit" => {
                self.query.max_limit = value.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            "server.listen" => {
                self.server.listen = value.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            _ => return Err(invalid("unknown configuration key".to_string())),
        }
        Ok(())
    }

    /// Check cross-field constraints and normalise the header name.
    pub fn validate(&mut self) -> ConfigResult<()> {
        let header = self.propagation.header_name.trim().to_ascii_lowercase();
        if header.is_empty() {
            return Err(ConfigError::Invalid(
                "propagation.header_name must not be empty".to_string(),
            ));
        }
        if !header
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid(format!(
                "propagation.header_name '{}' is not a valid header name",
                header
            )));
        }
        self.propagation.header_name = header;

        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            return Err(ConfigError::Invalid(format!(
                "query.default_limit ({}) must be between 1 and query.max_limit ({})",
                self.query.default_limit, self.query.max_limit
            )));
        }

        if self.store.backend == StoreBackend::Sled && self.store.path.is_none() {
            return Err(ConfigError::Invalid(
                "store.path is required for the sled backend".to_string(),
            ));
        }

        Ok(())
    }
}
