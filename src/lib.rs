//! # cacheproxy
//!
//! A concurrent HTTP/1.0 forward proxy with a bounded, byte-budgeted LRU
//! object cache, plus the tiny static/CGI origin server it is usually paired
//! with.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cacheproxy::cache::ObjectCache;
//! use cacheproxy::config::ProxyConfig;
//! use cacheproxy::proxy::Proxy;
//! use cacheproxy::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProxyConfig::default();
//!     let cache = Arc::new(ObjectCache::new(config.cache_limits(), config.cache_key)?);
//!     let proxy = Arc::new(Proxy::new(config.clone(), cache, config.connector()?));
//!
//!     let server = Server::bind("127.0.0.1:15213").await?;
//!     server
//!         .run(move |stream, peer| {
//!             let proxy = Arc::clone(&proxy);
//!             async move { proxy.serve(stream, peer).await.map(drop) }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod channel;
pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
pub mod tiny;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheKeyMode, CacheStats, ObjectCache};
pub use config::{ConfigError, ProxyConfig};
pub use http::{Method, StatusCode};
pub use proxy::{Outcome, Proxy, ProxyError};
pub use server::{Server, ServerError};
pub use tiny::Tiny;
