//! Request-target resolution.
//!
//! Splits an absolute-form (or authority-first) request URI into the origin
//! host, port, and the path to forward. No percent-decoding is done and the
//! query string stays attached to the path.

use thiserror::Error;

/// Errors produced by [`resolve`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("no path after the authority in {0:?}")]
    MissingPath(String),

    #[error("empty host in {0:?}")]
    EmptyHost(String),

    #[error("invalid port {port:?} in {uri:?}")]
    InvalidPort { uri: String, port: String },
}

/// The origin a request is aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    /// Everything from the first `/` after the authority, query included.
    pub path: String,
}

impl Target {
    /// `host:port`, as used for the injected `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolves `uri` into a [`Target`], using `default_port` when the authority
/// carries none.
///
/// # Errors
///
/// - [`UriError::MissingPath`]: no `/` follows the authority.
/// - [`UriError::EmptyHost`]: the authority has no host part.
/// - [`UriError::InvalidPort`]: the port is not a number in `0..=65535`.
///
/// # Examples
///
/// ```
/// use cacheproxy::proxy::uri::resolve;
///
/// let target = resolve("http://example.com:8080/a/b?x=1", 80).unwrap();
/// assert_eq!(target.host, "example.com");
/// assert_eq!(target.port, 8080);
/// assert_eq!(target.path, "/a/b?x=1");
/// ```
pub fn resolve(uri: &str, default_port: u16) -> Result<Target, UriError> {
    let rest = match uri.find("//") {
        Some(idx) => &uri[idx + 2..],
        None => uri,
    };

    let slash = rest
        .find('/')
        .ok_or_else(|| UriError::MissingPath(uri.to_owned()))?;
    let (authority, path) = rest.split_at(slash);

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| UriError::InvalidPort {
                uri: uri.to_owned(),
                port: port.to_owned(),
            })?;
            (host, port)
        }
        None => (authority, default_port),
    };

    if host.is_empty() {
        return Err(UriError::EmptyHost(uri.to_owned()));
    }

    Ok(Target {
        host: host.to_owned(),
        port,
        path: path.to_owned(),
    })
}
