//! A tiny HTTP/1.0 origin server for static files and CGI programs.
//!
//! It answers one request per connection and closes. Any request path that
//! contains `cgi-bin` runs the named program with `QUERY_STRING` and
//! `REQUEST_METHOD` in its environment and streams its standard output back;
//! every other path is served from the document root.

use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError};
use crate::http::headers::is_blank_line;
use crate::http::request::RequestError;
use crate::http::response::{SERVER_NAME, send_error};
use crate::http::{Method, Request, Response, StatusCode};

/// Longest request line or header line accepted.
const MAX_LINE: usize = 8192;

/// Most lines accepted in one request head, request line included.
const MAX_HEAD_LINES: usize = 100;

/// Marker that selects dynamic content.
const CGI_MARKER: &str = "cgi-bin";

/// Appended to request paths that name a directory.
const INDEX_FILE: &str = "home.html";

#[derive(Debug, Error)]
pub enum TinyError {
    #[error("connection: {0}")]
    Channel(#[from] ChannelError),

    #[error("request head exceeds {limit} lines")]
    HeadTooLong { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Maps a file name to the `Content-type` it is served with.
///
/// # Examples
///
/// ```
/// use cacheproxy::tiny::mime_type;
/// use std::path::Path;
///
/// assert_eq!(mime_type(Path::new("./home.html")), "text/html");
/// assert_eq!(mime_type(Path::new("./godzilla.gif")), "image/gif");
/// assert_eq!(mime_type(Path::new("./notes")), "text/plain");
/// ```
pub fn mime_type(path: &Path) -> &'static str {
    const TABLE: [(&str, &str); 6] = [
        (".html", "text/html"),
        (".gif", "image/gif"),
        (".png", "image/png"),
        (".jpg", "image/jpeg"),
        (".mpg", "video/mpg"),
        (".mp4", "video/mp4"),
    ];
    let name = path.to_string_lossy();
    TABLE
        .iter()
        .find(|(ext, _)| name.contains(*ext))
        .map_or("text/plain", |&(_, mime)| mime)
}

/// The tiny origin server, rooted at a document directory.
#[derive(Debug, Clone)]
pub struct Tiny {
    root: PathBuf,
}

impl Tiny {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a request path onto the document root.
    ///
    /// Returns `None` if the path tries to climb out of the root.
    fn filename(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        let mut filename = self.root.join(relative);
        if path.ends_with('/') {
            filename.push(INDEX_FILE);
        }
        Some(filename)
    }

    /// Reads one request from `stream`, answers it, and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error only when the connection itself fails; bad requests
    /// are answered with an error document.
    pub async fn serve<S>(&self, stream: S, peer: SocketAddr) -> Result<(), TinyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut channel = Channel::new(stream, MAX_LINE);

        let Some(head) = read_head(&mut channel).await? else {
            debug!(peer = %peer, "client closed before sending a request");
            return Ok(());
        };

        match Request::parse(&head) {
            Ok((request, _)) => {
                info!(peer = %peer, method = %request.method(), uri = request.uri(), "request");
                self.respond(&mut channel, &request).await?;
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "unparseable request");
                send_error(
                    &mut channel,
                    StatusCode::BadRequest,
                    "Bad request",
                    "Tiny could not parse the request",
                    &request_error_cause(&e),
                )
                .await?;
            }
        }

        channel.shutdown().await?;
        Ok(())
    }

    async fn respond<S>(&self, channel: &mut Channel<S>, request: &Request) -> Result<(), TinyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let method = request.method();
        if !method.is_supported() {
            send_error(
                channel,
                StatusCode::NotImplemented,
                "Not implemented",
                "Tiny does not implement this method",
                method.as_str(),
            )
            .await?;
            return Ok(());
        }

        let Some(filename) = self.filename(request.path()) else {
            send_error(
                channel,
                StatusCode::Forbidden,
                "Forbidden",
                "Tiny won't serve paths outside its root",
                request.path(),
            )
            .await?;
            return Ok(());
        };

        let metadata = match tokio::fs::metadata(&filename).await {
            Ok(metadata) => metadata,
            Err(_) => {
                send_error(
                    channel,
                    StatusCode::NotFound,
                    "Not found",
                    "Tiny couldn't find this file",
                    &filename.to_string_lossy(),
                )
                .await?;
                return Ok(());
            }
        };

        if request.uri().contains(CGI_MARKER) {
            if !metadata.is_file() || !permits(&metadata, 0o100) {
                send_error(
                    channel,
                    StatusCode::Forbidden,
                    "Forbidden",
                    "Tiny couldn't run the CGI program",
                    &filename.to_string_lossy(),
                )
                .await?;
                return Ok(());
            }
            serve_dynamic(channel, &filename, request.query_string().unwrap_or(""), method).await
        } else {
            if !metadata.is_file() || !permits(&metadata, 0o400) {
                send_error(
                    channel,
                    StatusCode::Forbidden,
                    "Forbidden",
                    "Tiny couldn't read the file",
                    &filename.to_string_lossy(),
                )
                .await?;
                return Ok(());
            }
            serve_static(channel, &filename, method).await
        }
    }
}

/// Reads the request head up to and including its blank line.
///
/// `None` means the client closed without sending anything.
async fn read_head<S>(channel: &mut Channel<S>) -> Result<Option<Vec<u8>>, TinyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = Vec::new();
    for _ in 0..MAX_HEAD_LINES {
        let line = match channel.read_line().await {
            Ok(line) => line,
            Err(ChannelError::Closed) if head.is_empty() => return Ok(None),
            // An unterminated head is left for the parser to reject.
            Err(ChannelError::Closed) => return Ok(Some(head)),
            Err(e) => return Err(e.into()),
        };
        let done = is_blank_line(&line);
        head.extend_from_slice(&line);
        if done {
            return Ok(Some(head));
        }
    }
    Err(TinyError::HeadTooLong {
        limit: MAX_HEAD_LINES,
    })
}

fn request_error_cause(err: &RequestError) -> String {
    match err {
        RequestError::Incomplete => "incomplete request head".to_owned(),
        other => other.to_string(),
    }
}

#[cfg(unix)]
fn permits(metadata: &std::fs::Metadata, mask: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & mask != 0
}

#[cfg(not(unix))]
fn permits(_metadata: &std::fs::Metadata, _mask: u32) -> bool {
    true
}

async fn serve_static<S>(
    channel: &mut Channel<S>,
    filename: &Path,
    method: &Method,
) -> Result<(), TinyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let body = tokio::fs::read(filename).await?;
    let response = Response::new(StatusCode::Ok)
        .header("Server", SERVER_NAME)
        .header("Connection", "close")
        .content_length(body.len())
        .header("Content-type", mime_type(filename));

    channel.write_all(&response.head_bytes()).await?;
    if *method != Method::Head {
        channel.write_all(&body).await?;
    }
    channel.flush().await?;
    debug!(file = %filename.display(), bytes = body.len(), "served static content");
    Ok(())
}

async fn serve_dynamic<S>(
    channel: &mut Channel<S>,
    filename: &Path,
    query: &str,
    method: &Method,
) -> Result<(), TinyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut child = match Command::new(filename)
        .env("QUERY_STRING", query)
        .env("REQUEST_METHOD", method.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(program = %filename.display(), error = %e, "CGI program failed to start");
            send_error(
                channel,
                StatusCode::InternalServerError,
                "Internal error",
                "Tiny couldn't start the CGI program",
                &filename.to_string_lossy(),
            )
            .await?;
            return Ok(());
        }
    };

    // The program writes the rest of the header block itself.
    let head = format!("HTTP/1.0 200 OK\r\nServer: {SERVER_NAME}\r\n");
    channel.write_all(head.as_bytes()).await?;

    let copied = match child.stdout.take() {
        Some(mut stdout) => channel.copy_from(&mut stdout).await?,
        None => 0,
    };
    let status = child.wait().await?;
    channel.flush().await?;
    debug!(program = %filename.display(), bytes = copied, %status, "CGI program finished");
    Ok(())
}
