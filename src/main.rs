mod ai;
mod api;
mod capture;
mod config;
mod error;
mod providers;
mod session;
mod speech;
#[cfg(test)]
mod test_support;
mod translation;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::api::{build_router, AppState};
use crate::capture::default_capture;
use crate::config::AppConfig;
use crate::providers::build_providers;

/// Relay for image description, chat, translation and speech.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Dotenv file loaded before reading configuration.
    #[arg(long, env = "RELAY_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,
    /// Overrides `HOST`.
    #[arg(long)]
    host: Option<String>,
    /// Overrides `PORT`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let dotenv = dotenvy::from_path(&args.env_file);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polyglot_relay=info,axum=info".into()),
        )
        .compact()
        .init();

    if let Err(err) = dotenv {
        if !err.not_found() {
            warn!(path = %args.env_file.display(), error = %err, "failed to load env file");
        }
    }

    let mut cfg = AppConfig::from_env()?;
    if let Some(host) = args.host {
        cfg.host = host;
    }
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if cfg.speech_key.is_none() || cfg.speech_region.is_none() {
        warn!("AZURE_SPEECH_KEY or AZURE_SPEECH_REGION not set; speech endpoints will fail");
    }

    let providers = build_providers(&cfg)?;
    let capture = default_capture(&cfg);
    let state = Arc::new(AppState::new(cfg.clone(), providers, capture));

    let app = build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        model = %cfg.genai_model,
        language = %cfg.default_language,
        capture_secs = cfg.capture_secs,
        "starting polyglot-relay"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
