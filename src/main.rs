// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow Ingest Service CLI entrypoint.

use clap::Parser;
use flow_ingest::{supervisor, Args, IngestConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone().unwrap_or_else(|| default_filter.to_string())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = IngestConfig::from_args(&args)?;

    tracing::info!("+----------------------------------------------------+");
    tracing::info!("|       Flow Ingest Service v{}                 |", env!("CARGO_PKG_VERSION"));
    tracing::info!("+----------------------------------------------------+");
    tracing::info!(topic = %config.topic, udp_port = config.udp_port, "starting");
    tracing::info!(brokers = ?config.brokers, "bus brokers");
    tracing::info!(
        workers = config.worker_count,
        queue_capacity = config.queue_capacity,
        "worker pool configured"
    );

    match supervisor::run(config).await {
        Ok(()) => {
            tracing::info!("flow-ingest stopped cleanly");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "flow-ingest stopped with a fatal error");
            Err(err.into())
        }
    }
}
