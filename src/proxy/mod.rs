//! Forward proxy request pipeline.
//!
//! One [`Proxy`] is shared by every connection. For each client it reads the
//! request line, resolves the target, and either answers from the
//! [`ObjectCache`](crate::cache::ObjectCache) or forwards the request to the
//! origin and relays the response back, caching small bodies on the way.

pub mod connector;
mod handler;
pub mod rewrite;
pub mod uri;

use std::io;

use thiserror::Error;

use crate::channel::ChannelError;
use crate::http::StatusCode;
use crate::http::request::RequestError;

pub use connector::{Connect, TcpConnector};
pub use handler::{Outcome, Proxy, SkipReason};
pub use rewrite::HeaderRewriter;
pub use uri::{Target, UriError, resolve};

/// Why a response could not be relayed faithfully.
#[derive(Debug, Error)]
pub enum Violation {
    #[error("response ended before the header block was terminated")]
    HeadersUnterminated,

    #[error("response header block exceeds {limit} lines")]
    TooManyHeaderLines { limit: usize },

    #[error("response body ended before the declared {expected} bytes")]
    TruncatedBody { expected: usize },

    #[error(transparent)]
    Channel(ChannelError),
}

/// Failures that end the handling of one connection.
///
/// Only the failures that map to an [`ErrorDocument`] are reported to the
/// client; the rest close the connection silently.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("client connection: {0}")]
    Client(#[source] ChannelError),

    #[error("malformed request line {line:?}: {source}")]
    MalformedRequestLine {
        line: String,
        #[source]
        source: RequestError,
    },

    #[error("request header block exceeds {limit} lines")]
    RequestHeadersTooLong { limit: usize },

    #[error("unsupported method {0}")]
    UnsupportedMethod(String),

    #[error("malformed URI: {0}")]
    MalformedUri(#[from] UriError),

    #[error("cannot reach origin {authority}: {source}")]
    OriginUnreachable {
        authority: String,
        #[source]
        source: io::Error,
    },

    #[error("origin protocol violation: {0}")]
    OriginProtocolViolation(#[from] Violation),
}

/// What to tell the client about a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDocument {
    pub status: StatusCode,
    pub short_message: &'static str,
    pub long_message: &'static str,
    pub cause: String,
}

impl ProxyError {
    /// The error page owed to the client, or `None` when the connection is
    /// simply dropped.
    pub fn error_document(&self) -> Option<ErrorDocument> {
        let (status, short_message, long_message, cause) = match self {
            Self::UnsupportedMethod(method) => (
                StatusCode::NotImplemented,
                "Not implemented",
                "Proxy does not implement this method",
                method.clone(),
            ),
            Self::MalformedRequestLine { line, .. } => (
                StatusCode::BadRequest,
                "Bad request",
                "Proxy could not parse the request line",
                line.clone(),
            ),
            Self::MalformedUri(err) => (
                StatusCode::BadRequest,
                "Bad request",
                "Proxy could not parse the request URI",
                err.to_string(),
            ),
            Self::OriginUnreachable { authority, .. } => (
                StatusCode::BadGateway,
                "Bad Gateway",
                "Failed to establish connection with the end server",
                authority.clone(),
            ),
            Self::Client(_)
            | Self::RequestHeadersTooLong { .. }
            | Self::OriginProtocolViolation(_) => return None,
        };
        Some(ErrorDocument {
            status,
            short_message,
            long_message,
            cause,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_failures_map_to_statuses() {
        let doc = ProxyError::UnsupportedMethod("POST".into())
            .error_document()
            .unwrap();
        assert_eq!(doc.status, StatusCode::NotImplemented);
        assert_eq!(doc.short_message, "Not implemented");
        assert_eq!(doc.cause, "POST");

        let doc = ProxyError::OriginUnreachable {
            authority: "h:1".into(),
            source: io::ErrorKind::ConnectionRefused.into(),
        }
        .error_document()
        .unwrap();
        assert_eq!(doc.status, StatusCode::BadGateway);
        assert_eq!(doc.cause, "h:1");

        let doc = ProxyError::from(UriError::MissingPath("http://h".into()))
            .error_document()
            .unwrap();
        assert_eq!(doc.status, StatusCode::BadRequest);
    }

    #[test]
    fn protocol_failures_are_silent() {
        assert!(ProxyError::Client(ChannelError::Closed).error_document().is_none());
        assert!(ProxyError::from(Violation::TruncatedBody { expected: 10 })
            .error_document()
            .is_none());
        assert!(ProxyError::RequestHeadersTooLong { limit: 1 }
            .error_document()
            .is_none());
    }
}
