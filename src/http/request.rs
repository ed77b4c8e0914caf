//! HTTP request parsing.
//!
//! Two shapes are supported. The proxy only ever needs the request line, which
//! it splits on whitespace ([`RequestLine`]); everything after it is streamed
//! through the header rewriter. The tiny origin server parses a complete
//! request head with the [`httparse`] crate ([`Request`]).

use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("request line is not valid UTF-8")]
    NotUtf8,
}

/// The first line of a request, split on whitespace.
///
/// # Examples
///
/// ```
/// use cacheproxy::http::{Method, RequestLine};
///
/// let line = RequestLine::parse(b"GET http://example.com/ HTTP/1.1\r\n").unwrap();
/// assert_eq!(line.method, Method::Get);
/// assert_eq!(line.uri, "http://example.com/");
/// assert_eq!(line.version.as_deref(), Some("HTTP/1.1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    /// The method exactly as the client spelled it; this is what gets forwarded.
    pub method_token: String,
    pub uri: String,
    /// The version token as sent; it is never forwarded.
    pub version: Option<String>,
}

impl RequestLine {
    /// Parses a raw request line (terminator optional).
    ///
    /// # Errors
    ///
    /// - [`RequestError::NotUtf8`]: the line contains invalid UTF-8.
    /// - [`RequestError::MissingField`]: the method or URI token is absent.
    pub fn parse(line: &[u8]) -> Result<Self, RequestError> {
        let line = std::str::from_utf8(line).map_err(|_| RequestError::NotUtf8)?;
        let mut tokens = line.split_ascii_whitespace();

        let method_token = tokens
            .next()
            .ok_or(RequestError::MissingField { field: "method" })?;
        let method: Method = method_token
            .parse()
            .unwrap_or_else(|never| match never {});
        let uri = tokens
            .next()
            .ok_or(RequestError::MissingField { field: "uri" })?
            .to_owned();
        let version = tokens.next().map(str::to_owned);

        Ok(Self {
            method,
            method_token: method_token.to_owned(),
            uri,
            version,
        })
    }
}

/// A fully parsed HTTP/1.x request head.
///
/// Created by [`Request::parse`] from a raw byte buffer holding at least the
/// complete header block.
///
/// # Examples
///
/// ```
/// use cacheproxy::http::request::Request;
///
/// let raw = b"GET /cgi-bin/adder?first=1&second=2 HTTP/1.0\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/cgi-bin/adder");
/// assert_eq!(request.query_string(), Some("first=1&second=2"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: String,
    path: String,
    query: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.x request head from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset just past the
    /// `\r\n\r\n` header terminator.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the request headers.
    /// - [`RequestError::Parse`]: the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`]: a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
            .unwrap_or_else(|never| match never {});

        let uri = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (uri.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        Ok((
            Self {
                method,
                uri: uri.to_owned(),
                path,
                query,
                version,
                headers: header_map,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target exactly as sent.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}
