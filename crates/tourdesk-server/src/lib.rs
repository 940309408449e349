//! Tourdesk Server - HTTP API for the travel agency CRM
//!
//! - JSON routes over axum for every store operation ([`router`])
//! - tenant identification through `X-Agency-Id` / `X-User-Id`
//! - a background task that expires overdue proposals ([`sweeper`])
//! - configuration from TOML and `TOURDESK_*` variables ([`config`])

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod extract;
mod routes;
pub mod state;
pub mod sweeper;

use anyhow::Context;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tourdesk_store::{connect, migrations, CrmStore};

pub use config::{LogFormat, ServerConfig};
pub use error::AppError;
pub use routes::router;
pub use state::AppState;

/// Install the global subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Open the database, apply migrations and serve until a shutdown signal
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    info!("Initializing state...");
    let pool = connect(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("cannot open database {}", config.database_url))?;
    migrations::run_pending(&pool)
        .await
        .context("database migration failed")?;
    let state = AppState::new(CrmStore::new(pool.clone()));

    let sweeper = (config.expire_sweep_secs > 0).then(|| {
        sweeper::spawn(
            state.clone(),
            Duration::from_secs(config.expire_sweep_secs),
        )
    });

    let address = config.listen_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind {address}"))?;
    info!(%address, "Server running");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    pool.close().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
