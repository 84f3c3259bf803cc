// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Health listener: accepts TCP connections and closes them
//! immediately. A live accept loop is the liveness signal; the content
//! of the connection never matters.

use crate::metrics::SharedStats;
use std::io;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Classify an accept error for the `kind` metric label, per spec.md
/// §4.5's "closed/other" split.
fn classify(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset => "closed",
        _ => "other",
    }
}

/// Run the accept-and-close loop until cancelled.
pub async fn run(listener: TcpListener, stats: SharedStats, cancel: CancellationToken) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((_stream, _peer)) => {
                        backoff = INITIAL_BACKOFF;
                        // Connection is dropped here, closing it.
                    }
                    Err(err) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let kind = classify(&err);
                        tracing::warn!(error = %err, kind, "health accept error");
                        stats.record_health_accept_error(kind);
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("health listener stopped");
}
