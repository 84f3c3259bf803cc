// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared scaffolding for end-to-end tests.

use flow_ingest::bus::BusError;
use flow_ingest::framing::FramedRecord;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// In-memory bus double shared by every integration scenario.
#[derive(Clone, Default)]
pub struct RecordingBus {
    pub produced: Arc<Mutex<Vec<FramedRecord>>>,
}

#[async_trait]
impl flow_ingest::bus::BusProducer for RecordingBus {
    async fn ensure_topic(&self, _name: &str, _partitions: u32, _replication: u16) -> Result<(), BusError> {
        Ok(())
    }

    fn produce(&self, record: FramedRecord) -> oneshot::Receiver<Result<(), BusError>> {
        let (tx, rx) = oneshot::channel();
        self.produced.lock().unwrap().push(record);
        let _ = tx.send(Ok(()));
        rx
    }

    async fn close(&self, _timeout: Duration) {}
}

/// Build a minimal well-formed sFlow v5 datagram containing exactly
/// one flow sample whose body is `marker`.
pub fn sflow_flow_sample(marker: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&5u32.to_be_bytes()); // version
    buf.extend_from_slice(&1u32.to_be_bytes()); // address type (IPv4)
    buf.extend_from_slice(&[10, 0, 0, 1]);
    buf.extend_from_slice(&1u32.to_be_bytes()); // sub agent id
    buf.extend_from_slice(&1u32.to_be_bytes()); // sequence number
    buf.extend_from_slice(&0u32.to_be_bytes()); // uptime
    buf.extend_from_slice(&1u32.to_be_bytes()); // sample count
    buf.extend_from_slice(&1u32.to_be_bytes()); // format = flow sample
    buf.extend_from_slice(&(marker.len() as u32).to_be_bytes());
    buf.extend_from_slice(marker);
    let pad = (4 - (marker.len() % 4)) % 4;
    buf.extend(std::iter::repeat(0u8).take(pad));
    buf
}

/// An sFlow v5 datagram with a zero-length sample list.
pub fn sflow_no_samples() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&5u32.to_be_bytes());
    buf.extend_from_slice(&1u32.to_be_bytes());
    buf.extend_from_slice(&[10, 0, 0, 1]);
    buf.extend_from_slice(&1u32.to_be_bytes());
    buf.extend_from_slice(&1u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes()); // sample count = 0
    buf
}
