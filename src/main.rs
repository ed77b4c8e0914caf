//! `cacheproxy <port>`: the caching forward proxy.
//!
//! Configuration is layered: built-in defaults, then `--config <file>`, then
//! the individual flags below. Logging honours `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cacheproxy::cache::{CacheKeyMode, ObjectCache};
use cacheproxy::config::ProxyConfig;
use cacheproxy::proxy::Proxy;
use cacheproxy::server::{Server, shutdown_signal};

#[derive(Debug, Parser)]
#[command(name = "cacheproxy", version, about = "Caching HTTP/1.0 forward proxy")]
struct Cli {
    /// Port to listen on.
    port: u16,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port assumed when a request URI names none.
    #[arg(long)]
    default_port: Option<u16>,

    /// Send every cache miss to this `host` or `host:port` instead.
    #[arg(long)]
    origin: Option<String>,

    /// How cache keys are built.
    #[arg(long, value_enum)]
    cache_key: Option<CacheKeyMode>,

    /// Total cache budget in bytes.
    #[arg(long)]
    max_cache_size: Option<usize>,

    /// Largest cacheable body in bytes.
    #[arg(long)]
    max_object_size: Option<usize>,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(port) = self.default_port {
            config.default_port = port;
        }
        if let Some(origin) = &self.origin {
            config.origin_override = Some(origin.clone());
        }
        if let Some(mode) = self.cache_key {
            config.cache_key = mode;
        }
        if let Some(size) = self.max_cache_size {
            config.max_cache_size = size;
        }
        if let Some(size) = self.max_object_size {
            config.max_object_size = size;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cacheproxy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ProxyConfig::load(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;
    info!(
        default_port = config.default_port,
        cache_key = ?config.cache_key,
        max_cache_size = config.max_cache_size,
        max_object_size = config.max_object_size,
        origin_override = ?config.origin_override,
        "configuration loaded"
    );

    let cache = Arc::new(ObjectCache::new(config.cache_limits(), config.cache_key)?);
    let connector = config.connector()?;
    let bind_addr = format!("{}:{}", config.bind_host, cli.port);
    let proxy = Arc::new(Proxy::new(config, Arc::clone(&cache), connector));

    let server = Server::bind(&bind_addr).await?;
    server
        .run_until(
            move |stream, peer| {
                let proxy = Arc::clone(&proxy);
                async move { proxy.serve(stream, peer).await.map(drop) }
            },
            shutdown_signal(),
        )
        .await?;

    let stats = cache.stats();
    match toml::to_string(&stats) {
        Ok(summary) => info!("cache statistics at shutdown:\n{summary}"),
        Err(e) => warn!(error = %e, "could not render cache statistics"),
    }
    info!(hit_rate = stats.hit_rate(), "proxy stopped");
    Ok(())
}
