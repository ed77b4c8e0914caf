//! Outbound connections to origin servers.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens the origin-facing connection for a cache miss.
///
/// The returned future must be `Send` because handlers run on a multi-threaded
/// runtime.
pub trait Connect: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Connects over TCP, optionally redirecting every request to a fixed origin.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    redirect: Option<(String, Option<u16>)>,
}

impl TcpConnector {
    /// Connects to whatever host and port each request resolves to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends every request to `host` instead of the resolved one. With
    /// `port = None` the resolved port is kept.
    pub fn with_override(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            redirect: Some((host.into(), port)),
        }
    }

    /// The address actually dialled for a resolved `host:port`.
    pub fn destination<'a>(&'a self, host: &'a str, port: u16) -> (&'a str, u16) {
        match &self.redirect {
            Some((to_host, to_port)) => (to_host.as_str(), to_port.unwrap_or(port)),
            None => (host, port),
        }
    }
}

impl Connect for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let (host, port) = self.destination(host, port);
        debug!(host, port, "connecting to origin");
        TcpStream::connect((host, port)).await
    }
}
