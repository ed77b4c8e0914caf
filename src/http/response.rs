//! HTTP/1.0 response builder and the HTML error responder.
//!
//! Everything this crate answers on its own behalf (cache hits, error
//! documents, static files) goes through [`Response`]. Responses relayed from
//! an origin never do; they are copied line by line.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Headers, StatusCode};
use crate::channel::{Channel, ChannelError};

/// Value of the `Server` header on responses this crate synthesizes.
pub const SERVER_NAME: &str = "Tiny Web Server";

/// An HTTP/1.0 response, ready to be serialized and sent.
///
/// Headers are written in insertion order; nothing is added implicitly, so
/// callers set `Content-length` themselves (see [`content_length`](Self::content_length)).
///
/// # Examples
///
/// ```
/// use cacheproxy::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Connection", "close")
///     .content_length(5)
///     .body("hello");
///
/// let bytes = response.into_bytes();
/// assert_eq!(
///     &bytes[..],
///     b"HTTP/1.0 200 OK\r\nConnection: close\r\nContent-length: 5\r\n\r\nhello"
/// );
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    reason: Cow<'static, str>,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Creates a new response with the given status, its canonical reason, and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: Cow::Borrowed(status.canonical_reason()),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Overrides the reason phrase on the status line.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<Cow<'static, str>>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a `Content-length` header declaring `len` bytes.
    ///
    /// The declared length need not match the attached body: a HEAD response
    /// declares the length of the body it omits.
    #[must_use]
    pub fn content_length(self, len: usize) -> Self {
        self.header("Content-length", len.to_string())
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Serializes the status line and headers, terminated by the blank line.
    pub fn head_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64 + self.headers.len() * 32);
        buf.put(format!("HTTP/1.0 {} {}\r\n", self.status.as_u16(), self.reason).as_bytes());
        buf.put(self.headers.to_string().as_bytes());
        buf.put(&b"\r\n"[..]);
        buf
    }

    /// Serializes the complete response using HTTP/1.0 wire format.
    pub fn into_bytes(self) -> BytesMut {
        let mut buf = self.head_bytes();
        buf.put(self.body);
        buf
    }
}

/// Renders the minimal HTML page that names an error status and its cause.
pub fn error_body(code: u16, short_message: &str, long_message: &str, cause: &str) -> String {
    format!(
        "<html><title>Tiny Error</title><body bgcolor=\"ffffff\">\r\n\
         {code}: {short_message}\r\n\
         <p>{long_message}: {cause}\r\n\
         <hr><em>The Tiny Web server</em>\r\n"
    )
}

/// Builds a complete error response: status line, `Content-type: text/html`,
/// `Content-length`, blank line, and the HTML body from [`error_body`].
pub fn error_response(
    status: StatusCode,
    short_message: &str,
    long_message: &str,
    cause: &str,
) -> Response {
    let body = error_body(status.as_u16(), short_message, long_message, cause);
    Response::new(status)
        .reason(short_message.to_owned())
        .header("Content-type", "text/html")
        .content_length(body.len())
        .body(body)
}

/// Writes an error document to `channel`.
///
/// There is no retry; callers close the connection afterwards.
///
/// # Errors
///
/// Returns the channel error if the peer has gone away.
pub async fn send_error<S>(
    channel: &mut Channel<S>,
    status: StatusCode,
    short_message: &str,
    long_message: &str,
    cause: &str,
) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = error_response(status, short_message, long_message, cause);
    channel.write_all(&response.into_bytes()).await?;
    channel.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn cache_hit_shape() {
        let r = Response::new(StatusCode::Ok)
            .header("Server", SERVER_NAME)
            .header("Connection", "close")
            .content_length(5)
            .body("hello");
        let s = to_string(r.into_bytes());
        assert_eq!(
            s,
            "HTTP/1.0 200 OK\r\nServer: Tiny Web Server\r\nConnection: close\r\nContent-length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn head_bytes_omit_body() {
        let r = Response::new(StatusCode::Ok).content_length(10).body("0123456789");
        let s = to_string(r.head_bytes());
        assert!(s.ends_with("Content-length: 10\r\n\r\n"));
        assert!(!s.contains("0123"));
    }

    #[test]
    fn error_response_declares_body_length() {
        let r = error_response(
            StatusCode::NotImplemented,
            "Not implemented",
            "Tiny does not implement this method",
            "POST",
        );
        assert_eq!(r.status(), StatusCode::NotImplemented);
        let s = to_string(r.into_bytes());
        let (head, body) = s.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.0 501 Not implemented\r\n"));
        assert!(head.contains("Content-type: text/html\r\n"));
        assert!(head.contains(&format!("Content-length: {}", body.len())));
        assert!(body.contains("501: Not implemented"));
        assert!(body.contains("Tiny does not implement this method: POST"));
    }

    #[tokio::test]
    async fn send_error_writes_to_channel() {
        let (near, mut far) = tokio::io::duplex(4096);
        let mut channel = Channel::new(near, 1024);
        send_error(&mut channel, StatusCode::BadGateway, "Bad Gateway", "unreachable", "h:1")
            .await
            .unwrap();
        drop(channel);

        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut far, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.0 502 Bad Gateway\r\n"));
        assert!(text.contains("unreachable: h:1"));
    }
}
