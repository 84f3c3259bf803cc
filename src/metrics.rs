// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observability surface: in-process atomic counters mirrored onto the
//! `metrics` facade, plus the Prometheus HTTP exporter.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters and gauges, snapshot-able for logging or
/// tests without requiring a live Prometheus scrape.
#[derive(Debug)]
pub struct IngestStats {
    pub ingress_bytes_total: AtomicU64,
    pub ingress_packets_total: AtomicU64,
    pub reader_errors_total: AtomicU64,
    pub decode_errors_total: AtomicU64,
    pub packets_without_flow_sample_total: AtomicU64,
    pub produce_ok_total: AtomicU64,
    pub produce_error_total: AtomicU64,
    pub health_accept_errors_total: AtomicU64,
    pub inflight_callbacks: AtomicI64,
    pub queue_depth: AtomicI64,
    pub worker_count: AtomicI64,
    created: Instant,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self {
            ingress_bytes_total: AtomicU64::new(0),
            ingress_packets_total: AtomicU64::new(0),
            reader_errors_total: AtomicU64::new(0),
            decode_errors_total: AtomicU64::new(0),
            packets_without_flow_sample_total: AtomicU64::new(0),
            produce_ok_total: AtomicU64::new(0),
            produce_error_total: AtomicU64::new(0),
            health_accept_errors_total: AtomicU64::new(0),
            inflight_callbacks: AtomicI64::new(0),
            queue_depth: AtomicI64::new(0),
            worker_count: AtomicI64::new(0),
            created: Instant::now(),
        }
    }
}

impl IngestStats {
    pub fn record_ingress(&self, bytes: u64) {
        self.ingress_bytes_total.fetch_add(bytes, Ordering::Relaxed);
        self.ingress_packets_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingress_bytes_total").increment(bytes);
        metrics::counter!("ingress_packets_total").increment(1);
    }

    pub fn record_reader_error(&self) {
        self.reader_errors_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("udp_reads_total", "result" => "error").increment(1);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("decode_errors_total").increment(1);
    }

    pub fn record_filtered_out(&self) {
        self.packets_without_flow_sample_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("packets_without_flow_sample_total").increment(1);
    }

    pub fn record_produce_outcome(&self, ok: bool) {
        if ok {
            self.produce_ok_total.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("produce_outcomes_total", "result" => "ok").increment(1);
        } else {
            self.produce_error_total.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("produce_outcomes_total", "result" => "error").increment(1);
        }
    }

    pub fn record_health_accept_error(&self, kind: &'static str) {
        self.health_accept_errors_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("health_accept_errors_total", "kind" => kind).increment(1);
    }

    pub fn inflight_inc(&self) {
        let value = self.inflight_callbacks.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("inflight_callbacks").set(value as f64);
    }

    pub fn inflight_dec(&self) {
        let value = self.inflight_callbacks.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!("inflight_callbacks").set(value as f64);
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
        metrics::gauge!("queue_depth").set(depth as f64);
    }

    pub fn set_worker_count(&self, count: i64) {
        self.worker_count.store(count, Ordering::Relaxed);
        metrics::gauge!("worker_count").set(count as f64);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            ingress_bytes_total: self.ingress_bytes_total.load(Ordering::Relaxed),
            ingress_packets_total: self.ingress_packets_total.load(Ordering::Relaxed),
            reader_errors_total: self.reader_errors_total.load(Ordering::Relaxed),
            decode_errors_total: self.decode_errors_total.load(Ordering::Relaxed),
            packets_without_flow_sample_total: self
                .packets_without_flow_sample_total
                .load(Ordering::Relaxed),
            produce_ok_total: self.produce_ok_total.load(Ordering::Relaxed),
            produce_error_total: self.produce_error_total.load(Ordering::Relaxed),
            health_accept_errors_total: self.health_accept_errors_total.load(Ordering::Relaxed),
            inflight_callbacks: self.inflight_callbacks.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            worker_count: self.worker_count.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

/// Point-in-time copy of [`IngestStats`], safe to log or serialize.
#[derive(Debug, Clone, Copy)]
pub struct IngestStatsSnapshot {
    pub ingress_bytes_total: u64,
    pub ingress_packets_total: u64,
    pub reader_errors_total: u64,
    pub decode_errors_total: u64,
    pub packets_without_flow_sample_total: u64,
    pub produce_ok_total: u64,
    pub produce_error_total: u64,
    pub health_accept_errors_total: u64,
    pub inflight_callbacks: i64,
    pub queue_depth: i64,
    pub worker_count: i64,
    pub uptime_secs: u64,
}

impl IngestStatsSnapshot {
    pub fn packets_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.ingress_packets_total as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}

/// Start the Prometheus `/metrics` HTTP exporter on `addr`.
pub fn install_exporter(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    Ok(())
}

pub type SharedStats = Arc<IngestStats>;
