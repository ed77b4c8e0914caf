//! `tiny <port>`: a minimal static and CGI origin server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cacheproxy::Tiny;
use cacheproxy::server::{Server, shutdown_signal};

/// Log filter used when `RUST_LOG` is unset; covers this binary's own target.
const DEFAULT_FILTER: &str = "cacheproxy=info,tiny=info";

#[derive(Debug, Parser)]
#[command(name = "tiny", version, about = "Tiny static and CGI web server")]
struct Cli {
    /// Port to listen on.
    port: u16,

    /// Document root.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let tiny = Arc::new(Tiny::new(cli.root));
    info!(root = %tiny.root().display(), "serving");

    let server = Server::bind(format!("0.0.0.0:{}", cli.port)).await?;
    server
        .run_until(
            move |stream, peer| {
                let tiny = Arc::clone(&tiny);
                async move { tiny.serve(stream, peer).await }
            },
            shutdown_signal(),
        )
        .await?;
    Ok(())
}
