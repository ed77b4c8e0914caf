//! HTTP/1.0 protocol types shared by the proxy and the tiny origin server.
//!
//! This module provides the core HTTP primitives:
//! [`Method`], [`StatusCode`], [`Headers`], [`Request`], and [`Response`].

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{Request, RequestLine};
pub use response::Response;

/// An HTTP response status code.
///
/// Only the codes this crate produces itself are modelled; responses relayed
/// from an origin are passed through byte-for-byte and never decoded.
///
/// # Examples
///
/// ```
/// use cacheproxy::http::StatusCode;
///
/// let status = StatusCode::BadGateway;
/// assert_eq!(status.as_u16(), 502);
/// assert_eq!(status.canonical_reason(), "Bad Gateway");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    // 2xx Success
    Ok = 200,

    // 4xx Client Error
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,

    // 5xx Server Error
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
}

impl StatusCode {
    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the canonical reason phrase for this status code.
    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::BadGateway => "Bad Gateway",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// `GET` and `HEAD` are recognised case-insensitively; everything else is kept
/// verbatim in the `Other` variant so it can be echoed back in error documents.
///
/// # Examples
///
/// ```
/// use cacheproxy::http::Method;
///
/// let method: Method = "get".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert!(method.is_supported());
///
/// let post: Method = "POST".parse().unwrap();
/// assert!(!post.is_supported());
/// assert_eq!(post.as_str(), "POST");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET: retrieve a representation of the target resource.
    Get,
    /// HEAD: identical to GET but without a response body.
    Head,
    /// Any other token, preserved as sent.
    Other(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Returns `true` for the methods this crate relays or serves (GET and HEAD).
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Get | Self::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("GET") {
            Self::Get
        } else if s.eq_ignore_ascii_case("HEAD") {
            Self::Head
        } else {
            Self::Other(s.to_owned())
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("Get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("head".parse::<Method>().unwrap(), Method::Head);
    }

    #[test]
    fn other_methods_keep_their_token() {
        let m: Method = "DELETE".parse().unwrap();
        assert_eq!(m, Method::Other("DELETE".into()));
        assert!(!m.is_supported());
        assert_eq!(m.to_string(), "DELETE");
    }

    #[test]
    fn status_display() {
        assert_eq!(StatusCode::NotImplemented.to_string(), "501 Not Implemented");
        assert_eq!(u16::from(StatusCode::Ok), 200);
    }
}
