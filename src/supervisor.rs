// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Supervisor: wires every component together, owns the root
//! cancellation token, and orchestrates startup/shutdown ordering.

use crate::bus::{BusClient, BusError, BusProducer};
use crate::config::IngestConfig;
use crate::health;
use crate::metrics::{self, IngestStats, SharedStats};
use crate::profiling;
use crate::reader::{bind_udp_socket, UdpReader};
use crate::worker::spawn_workers;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Errors that can prevent the service from starting, or that end it
/// early.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("failed to bind UDP socket: {0}")]
    UdpBind(#[source] io::Error),

    #[error("failed to bind health TCP listener: {0}")]
    HealthBind(#[source] io::Error),
}

const BUS_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the ingest service to completion, returning once a shutdown
/// signal has been received and every subsystem has drained cleanly.
pub async fn run(config: IngestConfig) -> Result<(), SupervisorError> {
    run_with_bus(config, |cfg| BusClient::connect(cfg).map_err(SupervisorError::Bus)).await
}

/// Same as [`run`], but with the bus client constructor injected so
/// tests can substitute an in-memory double.
pub async fn run_with_bus<B, F>(config: IngestConfig, build_bus: F) -> Result<(), SupervisorError>
where
    B: BusProducer + 'static,
    F: FnOnce(&IngestConfig) -> Result<B, SupervisorError>,
{
    let stats: SharedStats = Arc::new(IngestStats::default());

    if let Err(err) = metrics::install_exporter(config.metrics_addr) {
        tracing::warn!(error = %err, "failed to start metrics exporter, continuing without it");
    }

    let bus = Arc::new(build_bus(&config)?);
    bus.ensure_topic(&config.topic, config.partitions, config.replication)
        .await?;

    let udp_socket =
        bind_udp_socket(config.udp_port).map_err(SupervisorError::UdpBind)?;
    let health_listener = TcpListener::bind(("0.0.0.0", config.health_port()))
        .await
        .map_err(SupervisorError::HealthBind)?;

    let cancel = CancellationToken::new();
    let (queue_tx, queue_rx) = async_channel::bounded(config.queue_capacity);

    let worker_handles = spawn_workers(
        config.worker_count,
        queue_rx,
        bus.clone(),
        stats.clone(),
        cancel.clone(),
    );

    let reader = UdpReader::new(
        udp_socket,
        queue_tx,
        config.read_timeout(),
        config.udp_buffer_bytes,
        stats.clone(),
        cancel.clone(),
    );
    let reader_handle = tokio::spawn(reader.run());

    let health_handle = tokio::spawn(health::run(health_listener, stats.clone(), cancel.clone()));
    let profiling_handle = profiling::maybe_spawn(config.enable_profiling, cancel.clone());

    // Every condition that can end the service once it is up and
    // running (reader UDP errors, health accept errors, per-record
    // produce failures) is transient and handled locally by its
    // subsystem; none of them are fatal to the process. Startup-time
    // failures (bad config, unreachable bus, unbindable sockets) are
    // already surfaced above via `?`, before any subsystem is spawned.
    // So the only thing that ends a healthy run is a shutdown signal.
    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received");

    cancel.cancel();
    drain(reader_handle, worker_handles, health_handle, profiling_handle, bus).await;
    Ok(())
}

async fn drain<B: BusProducer + 'static>(
    reader_handle: tokio::task::JoinHandle<()>,
    worker_handles: Vec<tokio::task::JoinHandle<()>>,
    health_handle: tokio::task::JoinHandle<()>,
    profiling_handle: Option<tokio::task::JoinHandle<()>>,
    bus: Arc<B>,
) {
    let _ = reader_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = health_handle.await;
    if let Some(handle) = profiling_handle {
        let _ = handle.await;
    }
    bus.close(BUS_CLOSE_TIMEOUT).await;
    tracing::info!("supervisor shutdown complete");
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
