//! Per-connection request handling.
//!
//! A connection moves through: request line read, method checked, URI
//! resolved, then either a cache hit (answered locally) or a miss (origin
//! connected, headers forwarded, response head and body relayed, body
//! conditionally cached). Every path ends with the connection closed.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::rewrite::HeaderRewriter;
use super::uri::{self, Target};
use super::{Connect, ProxyError, Violation};
use crate::cache::{CacheEntry, Insertion, ObjectCache};
use crate::channel::{Channel, ChannelError};
use crate::config::ProxyConfig;
use crate::http::headers::{self, is_blank_line};
use crate::http::response::{SERVER_NAME, send_error};
use crate::http::{Method, RequestLine, Response, StatusCode};

/// Bytes moved from origin to client per read while relaying a body.
const RELAY_CHUNK: usize = 16 * 1024;

/// Why a relayed response was not cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The declared length exceeds the object limit.
    TooLarge,
    /// HEAD responses carry no body to cache.
    HeadRequest,
    /// The origin declared no usable `Content-Length`.
    MissingContentLength,
}

/// How a connection finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Answered from the cache.
    Served { bytes: usize },
    /// Relayed from the origin and stored.
    Populated { bytes: usize, evicted: usize },
    /// Relayed from the origin, not stored.
    Skipped { bytes: usize, reason: SkipReason },
    /// An error document was sent to the client.
    ErrorSent(StatusCode),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Served { bytes } => write!(f, "cache hit ({bytes} bytes)"),
            Self::Populated { bytes, evicted } => {
                write!(f, "cache miss, stored ({bytes} bytes, {evicted} evicted)")
            }
            Self::Skipped { bytes, reason } => {
                write!(f, "cache miss, not stored ({bytes} bytes, {reason:?})")
            }
            Self::ErrorSent(status) => write!(f, "error {status}"),
        }
    }
}

/// The caching forward proxy.
///
/// Shared across connection tasks behind an `Arc`; each call to
/// [`serve`](Self::serve) handles one client connection to completion.
pub struct Proxy<C> {
    config: ProxyConfig,
    cache: Arc<ObjectCache>,
    connector: C,
}

impl<C: Connect> Proxy<C> {
    /// Creates a proxy over an already-constructed cache.
    pub fn new(config: ProxyConfig, cache: Arc<ObjectCache>, connector: C) -> Self {
        Self {
            config,
            cache,
            connector,
        }
    }

    /// The shared object cache.
    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    /// The active configuration.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Handles one client connection and closes it.
    ///
    /// Failures that have an error document are reported to the client and
    /// yield [`Outcome::ErrorSent`].
    ///
    /// # Errors
    ///
    /// Returns the failure when the connection was dropped without a
    /// complete response (client went away, origin protocol violation).
    pub async fn serve<S>(&self, stream: S, peer: SocketAddr) -> Result<Outcome, ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut client = Channel::new(stream, self.config.max_line_length);

        let outcome = match self.process(&mut client).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let Some(doc) = err.error_document() else {
                    return Err(err);
                };
                warn!(peer = %peer, error = %err, "request failed");
                send_error(
                    &mut client,
                    doc.status,
                    doc.short_message,
                    doc.long_message,
                    &doc.cause,
                )
                .await
                .map_err(ProxyError::Client)?;
                Outcome::ErrorSent(doc.status)
            }
        };

        if let Err(e) = client.shutdown().await {
            debug!(peer = %peer, error = %e, "client shutdown failed");
        }
        info!(peer = %peer, %outcome, "request complete");
        Ok(outcome)
    }

    async fn process<S>(&self, client: &mut Channel<S>) -> Result<Outcome, ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let line = client.read_line().await.map_err(ProxyError::Client)?;
        // A line cut short by EOF means the client went away mid-request.
        if !line.ends_with(b"\n") {
            return Err(ProxyError::Client(ChannelError::Closed));
        }
        let request = RequestLine::parse(&line).map_err(|source| {
            ProxyError::MalformedRequestLine {
                line: String::from_utf8_lossy(&line).trim_end().to_owned(),
                source,
            }
        })?;

        if !request.method.is_supported() {
            return Err(ProxyError::UnsupportedMethod(request.method.to_string()));
        }

        let target = uri::resolve(&request.uri, self.config.default_port)?;
        debug!(
            method = %request.method,
            host = %target.host,
            port = target.port,
            path = %target.path,
            "request resolved"
        );

        let key = match request.method {
            Method::Get => {
                let key = self.cache.key_for(&target.host, target.port, &target.path);
                if let Some(entry) = self.cache.lookup(&key) {
                    serve_cached(client, &entry).await?;
                    self.cache.touch(&key);
                    return Ok(Outcome::Served {
                        bytes: entry.size(),
                    });
                }
                Some(key)
            }
            _ => None,
        };

        self.forward(client, &request, &target, key).await
    }

    /// Cache-miss path: fetch from the origin and relay to the client.
    async fn forward<S>(
        &self,
        client: &mut Channel<S>,
        request: &RequestLine,
        target: &Target,
        key: Option<String>,
    ) -> Result<Outcome, ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let stream = self
            .connector
            .connect(&target.host, target.port)
            .await
            .map_err(|source| ProxyError::OriginUnreachable {
                authority: target.authority(),
                source,
            })?;
        let mut origin = Channel::new(stream, self.config.max_line_length);

        self.forward_head(client, &mut origin, request, target).await?;
        let declared = self.relay_head(&mut origin, client).await?;

        let Some(key) = key else {
            return Ok(Outcome::Skipped {
                bytes: 0,
                reason: SkipReason::HeadRequest,
            });
        };
        let Some(len) = declared else {
            warn!(path = %target.path, "origin response has no Content-Length; relaying headers only");
            return Ok(Outcome::Skipped {
                bytes: 0,
                reason: SkipReason::MissingContentLength,
            });
        };

        let capture = self.cache.admits(len);
        let body = relay_body(&mut origin, client, len, capture).await?;

        match body {
            Some(body) => match self.cache.insert(key, body) {
                Insertion::Stored { evicted, .. } => Ok(Outcome::Populated {
                    bytes: len,
                    evicted,
                }),
                Insertion::Rejected { .. } => Ok(Outcome::Skipped {
                    bytes: len,
                    reason: SkipReason::TooLarge,
                }),
            },
            None => Ok(Outcome::Skipped {
                bytes: len,
                reason: SkipReason::TooLarge,
            }),
        }
    }

    /// Sends `METHOD PATH HTTP/1.0` and the rewritten client headers.
    async fn forward_head<S, O>(
        &self,
        client: &mut Channel<S>,
        origin: &mut Channel<O>,
        request: &RequestLine,
        target: &Target,
    ) -> Result<(), ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: AsyncRead + AsyncWrite + Unpin,
    {
        let request_line = format!("{} {} HTTP/1.0\r\n", request.method_token, target.path);
        origin
            .write_all(request_line.as_bytes())
            .await
            .map_err(Violation::Channel)?;

        let mut rewriter =
            HeaderRewriter::new(&target.host, target.port, &self.config.user_agent);
        let mut count = 0;
        loop {
            let line = match client.read_line().await {
                Ok(line) => line,
                // A client that half-closes without the blank line has still
                // finished its header block.
                Err(ChannelError::Closed) => break,
                Err(e) => return Err(ProxyError::Client(e)),
            };
            if is_blank_line(&line) {
                break;
            }
            count += 1;
            if count > self.config.max_header_lines {
                return Err(ProxyError::RequestHeadersTooLong {
                    limit: self.config.max_header_lines,
                });
            }
            origin
                .write_all(&rewriter.rewrite_line(&line))
                .await
                .map_err(Violation::Channel)?;
        }

        for line in rewriter.finish() {
            origin.write_all(&line).await.map_err(Violation::Channel)?;
        }
        origin.flush().await.map_err(Violation::Channel)?;
        Ok(())
    }

    /// Copies the origin's status line and headers to the client unchanged,
    /// returning the first `Content-Length` seen.
    async fn relay_head<S, O>(
        &self,
        origin: &mut Channel<O>,
        client: &mut Channel<S>,
    ) -> Result<Option<usize>, ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: AsyncRead + AsyncWrite + Unpin,
    {
        let limit = self.config.max_header_lines;
        let mut declared = None;
        // The status line counts toward the limit as well.
        for _ in 0..=limit {
            let line = match origin.read_line().await {
                Ok(line) => line,
                Err(ChannelError::Closed) => return Err(Violation::HeadersUnterminated.into()),
                Err(e) => return Err(Violation::Channel(e).into()),
            };
            if declared.is_none() {
                declared = headers::content_length(&line);
            }
            client.write_all(&line).await.map_err(ProxyError::Client)?;
            if is_blank_line(&line) {
                return Ok(declared);
            }
        }
        Err(Violation::TooManyHeaderLines { limit }.into())
    }
}

/// Writes a synthesized `200 OK` head followed by the cached body.
async fn serve_cached<S>(client: &mut Channel<S>, entry: &CacheEntry) -> Result<(), ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = Response::new(StatusCode::Ok)
        .header("Server", SERVER_NAME)
        .header("Connection", "close")
        .content_length(entry.size())
        .head_bytes();
    client.write_all(&head).await.map_err(ProxyError::Client)?;
    client
        .write_all(entry.body())
        .await
        .map_err(ProxyError::Client)?;
    client.flush().await.map_err(ProxyError::Client)
}

/// Relays exactly `len` body bytes, keeping a copy when `capture` is set.
async fn relay_body<S, O>(
    origin: &mut Channel<O>,
    client: &mut Channel<S>,
    len: usize,
    capture: bool,
) -> Result<Option<Bytes>, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    O: AsyncRead + AsyncWrite + Unpin,
{
    let mut captured = capture.then(|| BytesMut::with_capacity(len));
    let mut remaining = len;

    while remaining > 0 {
        let n = remaining.min(RELAY_CHUNK);
        let chunk = origin.read_exact(n).await.map_err(|e| match e {
            ChannelError::Truncated { .. } => Violation::TruncatedBody { expected: len },
            other => Violation::Channel(other),
        })?;
        client.write_all(&chunk).await.map_err(ProxyError::Client)?;
        if let Some(buf) = captured.as_mut() {
            buf.extend_from_slice(&chunk);
        }
        remaining -= n;
    }
    client.flush().await.map_err(ProxyError::Client)?;

    Ok(captured.map(BytesMut::freeze))
}
