//! `trust-gate` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP export).
//! 3. Build the [`KeyProvider`]; AWS clients are only initialised for the
//!    envelope source.
//! 4. Resolve the data key once so startup fails fast on a bad key.
//! 5. Spawn the background key refresh task, if configured.
//! 6. Build the Axum router and serve until Ctrl-C / SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use gate::aws::AwsClients;
use gate::config::{Config, KeySourceConfig};
use gate::keys::{self, KeyProvider};
use gate::server::{self, state::AppState};
use gate::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "trust-gate starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key provider
    // -----------------------------------------------------------------------
    let provider = match cfg.key_source()? {
        KeySourceConfig::Explicit { key_b64, key_id } => {
            info!(key_id = %key_id, "using explicit data key");
            KeyProvider::explicit(key_b64, key_id)
        }
        KeySourceConfig::Envelope {
            secret_id,
            kms_key_id,
            key_id,
        } => {
            info!(key_id = %key_id, secret_id = %secret_id, "using envelope data key");
            let aws = AwsClients::init(cfg.aws_endpoint_url.as_deref()).await?;
            KeyProvider::envelope(
                Arc::new(aws.secret_store()),
                Arc::new(aws.key_unwrapper(kms_key_id)),
                secret_id,
                key_id,
            )
        }
    };

    // -----------------------------------------------------------------------
    // 4. Key warm-up
    // -----------------------------------------------------------------------
    provider
        .resolve()
        .await
        .context("failed to resolve data key at startup")?;

    // -----------------------------------------------------------------------
    // 5. Background tasks
    // -----------------------------------------------------------------------
    let _key_refresh = cfg
        .key_refresh_interval()
        .map(|interval| keys::refresh_task(provider.clone(), interval));

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(AppState::new(provider));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("trust-gate stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
