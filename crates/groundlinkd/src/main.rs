//! groundlinkd: ground-control link daemon.
//!
//! Usage: `groundlinkd [udp:<port> | tcp:<host>:<port> | serial:<path>[:<baud>]]`.
//! With no argument the configured link is opened if `link.auto_connect` is set.

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use groundlink_core::config::GroundlinkConfig;
use groundlink_services::{ConnectionSpec, LinkSettings, LinkSupervisor, TelemetryRecorder, TelemetryStore};

mod event_log;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = GroundlinkConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = GroundlinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        GroundlinkConfig::default()
    });

    let requested = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<ConnectionSpec>())
        .transpose()
        .context("invalid connection argument")?;
    let default_connection = ConnectionSpec::from_config(&config.link);

    let local = config.identity.local();
    tracing::info!(
        system_id = local.system_id,
        component_id = local.component_id,
        "groundlinkd starting"
    );

    // ── Tasks ────────────────────────────────────────────────────────────────

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let (supervisor, link) = LinkSupervisor::new(LinkSettings::from(&config), shutdown_tx.subscribe());
    let supervisor_task = tokio::spawn(supervisor.run());

    let event_log_task = tokio::spawn(event_log::EventLogger::new(link.subscribe(), shutdown_tx.subscribe()).run());

    let telemetry = TelemetryStore::new();
    let recorder_task = tokio::spawn(
        TelemetryRecorder::new(telemetry.clone(), link.subscribe(), shutdown_tx.subscribe()).run(),
    );

    let startup = requested.or_else(|| config.link.auto_connect.then(|| default_connection.clone()));
    match startup {
        Some(spec) => match link.connect(spec.clone()).await {
            Ok(transport) => tracing::info!(%transport, "link opened, waiting for vehicle heartbeat"),
            // Not fatal: the API can retry.
            Err(e) => tracing::warn!(%spec, error = %e, "failed to open link"),
        },
        None => tracing::info!("no link opened at startup; use `groundlink-ctl connect`"),
    }

    // HTTP API
    let api_port = config.api.port;
    let state = groundlink_api::ApiState {
        link: link.clone(),
        telemetry,
        default_connection,
        default_takeoff_altitude: config.mission.default_takeoff_altitude,
        shutdown_tx: shutdown_tx.clone(),
    };
    let api_task = tokio::spawn(async move {
        if let Err(e) = groundlink_api::serve(state, api_port).await {
            tracing::error!(error = %e, "API server failed");
        }
    });

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = tokio::signal::ctrl_c()   => tracing::info!("interrupted, shutting down"),
        _ = shutdown_rx.recv()        => tracing::info!("shutting down"),
        r = supervisor_task           => tracing::error!("link supervisor exited: {:?}", r),
        r = event_log_task            => tracing::error!("event logger exited: {:?}", r),
        r = recorder_task             => tracing::error!("telemetry recorder exited: {:?}", r),
        r = api_task                  => tracing::error!("API server exited: {:?}", r),
    }

    match link.disconnect().await {
        Ok(true) => tracing::info!("link closed"),
        Ok(false) => {}
        Err(e) => tracing::debug!(error = %e, "disconnect on shutdown failed"),
    }
    let _ = shutdown_tx.send(());

    Ok(())
}
