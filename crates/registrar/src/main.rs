//! # Registrar - campus portal login relay
//!
//! Logs students into the university identity provider (captcha included),
//! keeps the resulting portal cookies behind an opaque token, and serves
//! grades, timetable and rankings from the application portal.
//!
//! ## Architecture
//! ```text
//! Mini-program → Registrar → Identity provider → Application portal
//!                    ↓
//!             Store (memory | Redis)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cipher;
mod config;
mod net;
mod portal;
mod routes;
mod schedule;
mod sso;
mod state;
mod store;

#[cfg(test)]
mod testing;

use config::{AppConfig, StoreBackend};
use state::AppState;

/// Registrar - campus portal login relay
#[derive(Parser, Debug)]
#[command(name = "registrar")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/registrar.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Store backend (overrides config)
    #[arg(long, value_enum, env = "REGISTRAR_STORE")]
    store: Option<StoreBackend>,

    /// Captcha recognition service URL (overrides config)
    #[arg(long, env = "CAPTCHA_SOLVER_URL")]
    solver_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Environment first so clap's `env` fallbacks see it
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Registrar v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(path = %args.config, store = ?config.store, "Configuration loaded");

    let state = AppState::new(config.clone()).await?;
    if config.store == StoreBackend::Redis {
        info!(url = %config.redis_url, "Redis store connected");
    }

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Registrar listening on {}", config.listen_addr);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Registrar shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install JSON subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to install subscriber")?;
    }

    Ok(())
}
