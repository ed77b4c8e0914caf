//! Proxy configuration.
//!
//! Values come from three layers, lowest precedence first: the built-in
//! defaults, an optional TOML file, and command-line flags (applied by the
//! binary). [`ProxyConfig::validate`] runs before anything is started.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{CacheError, CacheKeyMode, CacheLimits, MAX_CACHE_SIZE, MAX_OBJECT_SIZE};
use crate::proxy::TcpConnector;
use crate::proxy::rewrite::DEFAULT_USER_AGENT;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid cache limits: {0}")]
    Cache(#[from] CacheError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings for the proxy.
///
/// # Examples
///
/// ```
/// use cacheproxy::config::ProxyConfig;
///
/// let config: ProxyConfig = toml::from_str(r#"
///     default_port = 8000
///     origin_override = "127.0.0.1"
///     cache_key = "authority"
/// "#).unwrap();
///
/// assert_eq!(config.default_port, 8000);
/// assert_eq!(config.max_object_size, 102_400);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address the listener binds to; the port is given on the command line.
    pub bind_host: String,
    /// Port used when a request URI names no port.
    pub default_port: u16,
    /// `host` or `host:port` that replaces every resolved origin on a cache miss.
    pub origin_override: Option<String>,
    /// Composition of cache keys.
    pub cache_key: CacheKeyMode,
    /// Total byte budget of the object cache.
    pub max_cache_size: usize,
    /// Largest body the cache will store.
    pub max_object_size: usize,
    /// `User-Agent` sent to origins.
    pub user_agent: String,
    /// Upper bound on any single request or response line.
    pub max_line_length: usize,
    /// Upper bound on the number of lines in a header block.
    pub max_header_lines: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_owned(),
            default_port: 80,
            origin_override: None,
            cache_key: CacheKeyMode::Path,
            max_cache_size: MAX_CACHE_SIZE,
            max_object_size: MAX_OBJECT_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_line_length: 8192,
            max_header_lines: 100,
        }
    }
}

impl ProxyConfig {
    /// Loads a TOML file; keys it omits keep their defaults.
    ///
    /// The result is not validated, so command-line overrides can still be
    /// applied before [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Checks the settings for internal consistency.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Cache`]: `max_object_size` exceeds `max_cache_size`,
    ///   or the cache budget is zero.
    /// - [`ConfigError::Invalid`]: a line bound is zero, the user agent is
    ///   empty, or the origin override does not parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache_limits().validate()?;
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "max_line_length must be greater than zero".into(),
            ));
        }
        if self.max_header_lines == 0 {
            return Err(ConfigError::Invalid(
                "max_header_lines must be greater than zero".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent must not be empty".into()));
        }
        self.connector()?;
        Ok(())
    }

    /// The size limits to build the object cache with.
    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            max_cache_size: self.max_cache_size,
            max_object_size: self.max_object_size,
        }
    }

    /// Builds the origin connector, honouring `origin_override`.
    pub fn connector(&self) -> Result<TcpConnector, ConfigError> {
        let Some(target) = self.origin_override.as_deref() else {
            return Ok(TcpConnector::new());
        };
        let (host, port) = split_override(target)?;
        Ok(TcpConnector::with_override(host, port))
    }
}

/// Splits `host`, `host:port`, `[v6]` or `[v6]:port` into host and port.
fn split_override(target: &str) -> Result<(&str, Option<u16>), ConfigError> {
    let invalid = |why: &str| ConfigError::Invalid(format!("origin_override {why}: {target}"));

    let (host, port) = match target.strip_prefix('[') {
        Some(rest) => {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| invalid("has an unclosed '['"))?;
            match after {
                "" => (host, None),
                _ => {
                    let port = after
                        .strip_prefix(':')
                        .ok_or_else(|| invalid("has text after ']'"))?;
                    (host, Some(port))
                }
            }
        }
        None => match target.split_once(':') {
            Some((_, rest)) if rest.contains(':') => {
                return Err(invalid("needs brackets around an IPv6 address"));
            }
            Some((host, port)) => (host, Some(port)),
            None => (target, None),
        },
    };

    let port = port
        .map(|p| p.parse::<u16>().map_err(|_| invalid("has an invalid port")))
        .transpose()?;
    if host.is_empty() {
        return Err(invalid("has no host"));
    }
    Ok((host, port))
}
