// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Optional heap-profiling endpoint, gated behind the `profiling`
//! feature and `enable_profiling` at runtime.
//!
//! Binds `localhost:6060` and, on every connection, writes a
//! jemalloc stats dump and closes. There is no routing: the endpoint
//! exists purely so an operator can `curl localhost:6060` during an
//! incident, same spirit as the health listener's accept-and-close
//! loop.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_ADDR: &str = "127.0.0.1:6060";

#[cfg(feature = "profiling")]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Start the profiling endpoint if both the `profiling` feature was
/// compiled in and the operator asked for it. Returns `None` when
/// either is false, so the supervisor simply has one fewer task to
/// join.
pub fn maybe_spawn(enabled: bool, cancel: CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
    if !enabled {
        return None;
    }
    if !cfg!(feature = "profiling") {
        tracing::warn!(
            "enable_profiling set but this binary was not built with the `profiling` feature; skipping"
        );
        return None;
    }
    Some(tokio::spawn(run(DEFAULT_ADDR.parse().expect("valid profiling addr"), cancel)))
}

async fn run(addr: SocketAddr, cancel: CancellationToken) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::warn!(error = %err, %addr, "failed to bind profiling endpoint, continuing without it");
            return;
        }
    };
    tracing::info!(%addr, "profiling endpoint listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _peer)) => serve_one(stream).await,
                    Err(err) => tracing::debug!(error = %err, "profiling accept error"),
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("profiling endpoint stopped");
}

async fn serve_one(mut stream: tokio::net::TcpStream) {
    use tokio::io::AsyncWriteExt;

    let body = jemalloc_stats_text();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

#[cfg(feature = "profiling")]
fn jemalloc_stats_text() -> String {
    use tikv_jemalloc_ctl::{epoch, stats};

    let _ = epoch::advance();
    let allocated = stats::allocated::read().unwrap_or(0);
    let resident = stats::resident::read().unwrap_or(0);
    let active = stats::active::read().unwrap_or(0);
    format!(
        "jemalloc_allocated_bytes {allocated}\njemalloc_resident_bytes {resident}\njemalloc_active_bytes {active}\n"
    )
}

#[cfg(not(feature = "profiling"))]
fn jemalloc_stats_text() -> String {
    "profiling feature not compiled in\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn maybe_spawn_returns_none_when_disabled() {
        let cancel = CancellationToken::new();
        assert!(maybe_spawn(false, cancel).is_none());
    }
}
