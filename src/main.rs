use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dirserv::config::{Args, ServerConfig};
use dirserv::precache;
use dirserv::serve::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let wrote_help = matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            );
            let _ = err.print();
            process::exit(if wrote_help { 0 } else { 1 });
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_args(args).context("invalid configuration")?;
    let server = Arc::new(Server::new(config));

    if server.config.precache {
        info!("pre-caching {}", server.config.root.display());
        let stats = precache::load(&server.cache, &server.types, &server.config.root)
            .context("pre-cache aborted")?;
        info!(
            "pre-cached {} files, {} ({:.1?})",
            stats.files,
            precache::fmt_bytes(stats.bytes),
            stats.elapsed
        );
    }

    let listener = TcpListener::bind(("0.0.0.0", server.config.port))
        .await
        .with_context(|| format!("unable to bind port {}", server.config.port))?;
    info!("now listening on 0.0.0.0:{}", server.config.port);

    tokio::select! {
        _ = Arc::clone(&server).run(listener) => {}
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping server");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
