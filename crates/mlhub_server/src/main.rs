//! mlhub_server: evaluate HTTP API plus the topic consumers.
//!
//! Config comes from a YAML file (`--config-file` or `MLHUB_CONFIG`); `.env`
//! is honoured. SIGINT/SIGTERM stop the consumers and drain HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mlhub_server::app::{App, ExternalServices};
use mlhub_server::config::Config;
use mlhub_server::provisioning::HttpEvaluateManager;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mlhub_server")]
#[command(about = "Evaluate lifecycle API and message consumers")]
struct Args {
    /// Path to the YAML config file
    #[arg(long, env = "MLHUB_CONFIG")]
    config_file: PathBuf,

    /// Default log level to debug when RUST_LOG is unset
    #[arg(long)]
    enable_debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.enable_debug {
        "debug"
    } else {
        "info,mlhub_server=debug,mlhub_core=debug"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load_from_file(&args.config_file)?;
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, path = %args.config_file.display(), "refusing to start");
        return Err(e).context("validating config");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let manager = HttpEvaluateManager::new(config.evaluate.endpoint.clone())?;
    let app = App::build(
        &config,
        ExternalServices::new(Arc::new(manager)),
        shutdown_rx.clone(),
    );
    let consumers = app.spawn_consumers(shutdown_rx.clone())?;
    tracing::info!(consumers = consumers.len(), "consumers started");

    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let listener = TcpListener::bind(&config.http.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.http.bind_addr))?;
    tracing::info!("mlhub_server listening on {}", config.http.bind_addr);

    let mut http_shutdown = shutdown_rx.clone();
    axum::serve(listener, app.router.clone())
        .with_graceful_shutdown(async move {
            let _ = http_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("http server")?;

    let drained = tokio::time::timeout(
        config.shutdown_timeout(),
        join_consumers(consumers),
    )
    .await;
    if drained.is_err() {
        tracing::warn!("consumers still busy after shutdown timeout");
    }

    tracing::info!("mlhub_server stopped");
    Ok(())
}

async fn join_consumers(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "consumer task panicked");
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "listening for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "listening for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
