// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker pool: decodes sFlow datagrams pulled from the bounded queue,
//! filters non-flow samples, frames survivors, and hands them to the
//! bus client.

use crate::bus::{BusError, BusProducer};
use crate::framing::FramedRecord;
use crate::metrics::SharedStats;
use crate::reader::Datagram;
use crate::sflow;
use async_channel::Receiver;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One decode/produce worker. Many of these race as consumers on the
/// same bounded queue.
pub struct Worker<B: BusProducer + 'static> {
    id: usize,
    queue_rx: Receiver<Datagram>,
    bus: Arc<B>,
    stats: SharedStats,
    cancel: CancellationToken,
    /// Tasks driving each in-flight record's delivery ack to
    /// completion. Produce itself never blocks on these; the worker
    /// only waits for them when it is about to exit, so the inflight
    /// gauge has reached zero by the time `run` returns.
    ack_tasks: JoinSet<()>,
}

impl<B: BusProducer + 'static> Worker<B> {
    pub fn new(
        id: usize,
        queue_rx: Receiver<Datagram>,
        bus: Arc<B>,
        stats: SharedStats,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue_rx,
            bus,
            stats,
            cancel,
            ack_tasks: JoinSet::new(),
        }
    }

    /// Process datagrams until the queue closes (graceful drain) or the
    /// cancellation token fires.
    pub async fn run(mut self) {
        loop {
            let datagram = tokio::select! {
                received = self.queue_rx.recv() => received,
                _ = self.cancel.cancelled(), if self.queue_rx.is_empty() => break,
            };

            let (_remote, bytes) = match datagram {
                Ok(datagram) => datagram,
                Err(_closed) => break,
            };

            self.process_one(bytes).await;
        }

        while self.ack_tasks.join_next().await.is_some() {}

        tracing::debug!(worker_id = self.id, "worker drained and stopped");
    }

    async fn process_one(&mut self, bytes: Vec<u8>) {
        let packet = match sflow::decode(&bytes) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::debug!(worker_id = self.id, error = %err, "decode error");
                self.stats.record_decode_error();
                return;
            }
        };

        if !packet.has_forwardable_sample() {
            self.stats.record_filtered_out();
            return;
        }

        let record = FramedRecord::new(Utc::now(), bytes);

        // produce() enqueues and returns immediately; the ack is driven
        // to completion on its own task so this loop can go straight
        // back to the queue instead of blocking on delivery.
        self.stats.inflight_inc();
        let ack_rx = self.bus.produce(record);
        let stats = self.stats.clone();
        let worker_id = self.id;
        self.ack_tasks.spawn(async move {
            let outcome = ack_rx.await.unwrap_or(Err(BusError::AckLost));
            stats.inflight_dec();
            stats.record_produce_outcome(outcome.is_ok());

            if let Err(err) = outcome {
                tracing::warn!(worker_id, error = %err, "produce failed, dropping record");
            }
        });
    }
}

/// Spawn `worker_count` workers and return their join handles.
pub fn spawn_workers<B: BusProducer + 'static>(
    worker_count: usize,
    queue_rx: Receiver<Datagram>,
    bus: Arc<B>,
    stats: SharedStats,
    cancel: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    stats.set_worker_count(worker_count as i64);
    (0..worker_count)
        .map(|id| {
            let worker = Worker::new(id, queue_rx.clone(), bus.clone(), stats.clone(), cancel.clone());
            tokio::spawn(worker.run())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::tests::MockBus;
    use crate::metrics::IngestStats;

    fn sflow_flow_sample_datagram() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes()); // one sample
        buf.extend_from_slice(&1u32.to_be_bytes()); // format = flow sample
        buf.extend_from_slice(&4u32.to_be_bytes()); // length
        buf.extend_from_slice(&[0u8; 4]);
        buf
    }

    fn sflow_counter_only_datagram() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes()); // format = counter sample
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf
    }

    #[tokio::test]
    async fn worker_forwards_flow_sample_packets() {
        let (tx, rx) = async_channel::bounded(4);
        let bus = Arc::new(MockBus::default());
        let stats = Arc::new(IngestStats::default());
        let cancel = CancellationToken::new();

        let worker = Worker::new(0, rx, bus.clone(), stats.clone(), cancel.clone());
        tx.send(("127.0.0.1:1".parse().unwrap(), sflow_flow_sample_datagram()))
            .await
            .unwrap();
        drop(tx);

        worker.run().await;

        assert_eq!(bus.produced.lock().unwrap().len(), 1);
        assert_eq!(stats.snapshot().produce_ok_total, 1);
    }

    #[tokio::test]
    async fn worker_drops_counter_only_packets() {
        let (tx, rx) = async_channel::bounded(4);
        let bus = Arc::new(MockBus::default());
        let stats = Arc::new(IngestStats::default());
        let cancel = CancellationToken::new();

        let worker = Worker::new(0, rx, bus.clone(), stats.clone(), cancel.clone());
        tx.send(("127.0.0.1:1".parse().unwrap(), sflow_counter_only_datagram()))
            .await
            .unwrap();
        drop(tx);

        worker.run().await;

        assert_eq!(bus.produced.lock().unwrap().len(), 0);
        assert_eq!(stats.snapshot().packets_without_flow_sample_total, 1);
    }

    #[tokio::test]
    async fn worker_counts_decode_errors() {
        let (tx, rx) = async_channel::bounded(4);
        let bus = Arc::new(MockBus::default());
        let stats = Arc::new(IngestStats::default());
        let cancel = CancellationToken::new();

        let worker = Worker::new(0, rx, bus, stats.clone(), cancel.clone());
        tx.send(("127.0.0.1:1".parse().unwrap(), vec![0u8; 2]))
            .await
            .unwrap();
        drop(tx);

        worker.run().await;

        assert_eq!(stats.snapshot().decode_errors_total, 1);
    }

    #[tokio::test]
    async fn worker_records_produce_failures() {
        let (tx, rx) = async_channel::bounded(4);
        let bus = Arc::new(MockBus::default());
        bus.fail_next
            .store(1, std::sync::atomic::Ordering::Relaxed);
        let stats = Arc::new(IngestStats::default());
        let cancel = CancellationToken::new();

        let worker = Worker::new(0, rx, bus, stats.clone(), cancel.clone());
        tx.send(("127.0.0.1:1".parse().unwrap(), sflow_flow_sample_datagram()))
            .await
            .unwrap();
        drop(tx);

        worker.run().await;

        assert_eq!(stats.snapshot().produce_error_total, 1);
        assert_eq!(stats.snapshot().inflight_callbacks, 0);
    }
}
