//! # Temperature / Id Relay Server
//!
//! Polls two PostgreSQL tables (sensor readings and identity events) on a
//! fixed interval and pushes the newest row of each to every connected
//! websocket client as `{"type": ..., "data": ...}`. New clients receive a
//! snapshot straight away instead of waiting for the next poll.

use anyhow::Result;
use lib_common::connections::PgGateway;
use lib_common::{ConnectionLifecycle, DataSource, PollScheduler, RelayContext, SubscriberRegistry};
use std::sync::Arc;
use tokio::signal;

mod relay_logic;
use relay_logic::{config, downstream, logger};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let (config, file_status) = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| "./logs".into());
    let _log_guard = logger::setup_logging(&log_dir, &config.effective_log_level())?;
    file_status.log();

    let relay_config = config.relay_config();
    tracing::info!("Configuration loaded: DB URL (hidden)\n{}", relay_config);

    tracing::debug!("Creating pool connection to database");
    let gateway = PgGateway::new(&config.pg_settings())?;
    let (temperature, id) = relay_config.bindings();
    let context = Arc::new(RelayContext::new(
        gateway,
        Arc::new(SubscriberRegistry::new()),
        relay_config.window_calculator()?,
        temperature,
        id,
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let scheduler = PollScheduler::new(context.clone(), relay_config.poll_interval);
    let scheduler_rx = shutdown_tx.subscribe();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_rx).await });

    let listener = downstream::bind(relay_config.port).await?;
    let downstream_handle = tokio::spawn(downstream::run(
        listener,
        ConnectionLifecycle::new(context.clone()),
        shutdown_tx.clone(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate_signal() => {
            tracing::info!("SIGTERM received, initiating shutdown.");
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let (scheduler_result, downstream_result) = tokio::join!(scheduler_handle, downstream_handle);
    if let Err(e) = scheduler_result {
        tracing::error!("Poll scheduler task failed: {}", e);
    }
    match downstream_result {
        Ok(Err(e)) => tracing::error!("Downstream server stopped with error: {}", e),
        Err(e) => tracing::error!("Downstream server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    tracing::info!("Closing connection and websocket server.");
    context.source().close();

    tracing::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate_signal() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            tracing::warn!("Could not install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
