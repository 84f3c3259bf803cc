// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sFlow v5 datagram decoding.
//!
//! Only enough of the datagram is parsed to classify each sample as a
//! flow sample, an expanded flow sample, or a counter sample. The
//! contents of a sample (its embedded header bytes, counters, or
//! extended data) are never parsed; a packet is either accepted or
//! rejected based on sample-kind tags alone.

use thiserror::Error;

const SFLOW_VERSION: u32 = 5;
const FLOW_SAMPLE: u32 = 1;
const COUNTER_SAMPLE: u32 = 2;
const EXPANDED_FLOW_SAMPLE: u32 = 3;
const EXPANDED_COUNTER_SAMPLE: u32 = 4;

/// Errors produced while decoding a raw datagram as sFlow v5.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram shorter than the sFlow v5 header")]
    Truncated,

    #[error("unsupported sFlow version {0}")]
    UnsupportedVersion(u32),

    #[error("sample count exceeds remaining datagram length")]
    SampleOverrun,
}

/// The kind of a single sample record inside a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    FlowSample,
    ExpandedFlowSample,
    CounterSample,
    Other(u32),
}

impl SampleKind {
    fn from_format(format: u32) -> Self {
        match format {
            FLOW_SAMPLE => SampleKind::FlowSample,
            EXPANDED_FLOW_SAMPLE => SampleKind::ExpandedFlowSample,
            COUNTER_SAMPLE | EXPANDED_COUNTER_SAMPLE => SampleKind::CounterSample,
            other => SampleKind::Other(other),
        }
    }

    /// Whether a packet containing this sample should be forwarded.
    pub fn forwards(self) -> bool {
        matches!(self, SampleKind::FlowSample | SampleKind::ExpandedFlowSample)
    }
}

/// A decoded sFlow v5 datagram: only the sample-kind tags are kept.
#[derive(Debug, Clone)]
pub struct SFlowPacket {
    pub agent_address_len: usize,
    pub sub_agent_id: u32,
    pub sequence_number: u32,
    pub uptime_ms: u32,
    pub samples: Vec<SampleKind>,
}

impl SFlowPacket {
    /// True iff at least one sample is a flow or expanded flow sample.
    pub fn has_forwardable_sample(&self) -> bool {
        self.samples.iter().any(|s| s.forwards())
    }
}

/// Big-endian, byte-oriented cursor over a raw datagram.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let bytes = &self.buf[self.pos..self.pos + 4];
        self.pos += 4;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Skip a length-prefixed opaque blob (IP address, sample body, ...).
    fn skip_opaque(&mut self, len: usize) -> Option<()> {
        let padded = (len + 3) & !3;
        if self.remaining() < padded {
            return None;
        }
        self.pos += padded;
        Some(())
    }
}

/// Decode a raw UDP datagram payload as an sFlow v5 packet.
pub fn decode(buf: &[u8]) -> Result<SFlowPacket, DecodeError> {
    let mut cursor = Cursor::new(buf);

    let version = cursor.read_u32().ok_or(DecodeError::Truncated)?;
    if version != SFLOW_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let address_type = cursor.read_u32().ok_or(DecodeError::Truncated)?;
    let agent_address_len = if address_type == 2 { 16 } else { 4 };
    cursor
        .skip_opaque(agent_address_len)
        .ok_or(DecodeError::Truncated)?;

    let sub_agent_id = cursor.read_u32().ok_or(DecodeError::Truncated)?;
    let sequence_number = cursor.read_u32().ok_or(DecodeError::Truncated)?;
    let uptime_ms = cursor.read_u32().ok_or(DecodeError::Truncated)?;
    let sample_count = cursor.read_u32().ok_or(DecodeError::Truncated)?;

    let mut samples = Vec::with_capacity(sample_count.min(64) as usize);
    for _ in 0..sample_count {
        let format = cursor.read_u32().ok_or(DecodeError::SampleOverrun)?;
        let length = cursor.read_u32().ok_or(DecodeError::SampleOverrun)? as usize;
        cursor.skip_opaque(length).ok_or(DecodeError::SampleOverrun)?;
        samples.push(SampleKind::from_format(format));
    }

    Ok(SFlowPacket {
        agent_address_len,
        sub_agent_id,
        sequence_number,
        uptime_ms,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_sample(buf: &mut Vec<u8>, format: u32, body: &[u8]) {
        buf.extend_from_slice(&format.to_be_bytes());
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);
        let pad = (4 - (body.len() % 4)) % 4;
        buf.extend(std::iter::repeat(0u8).take(pad));
    }

    fn header(sample_count: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_be_bytes()); // version
        buf.extend_from_slice(&1u32.to_be_bytes()); // address type = IPv4
        buf.extend_from_slice(&[10, 0, 0, 1]); // agent address
        buf.extend_from_slice(&42u32.to_be_bytes()); // sub agent id
        buf.extend_from_slice(&1000u32.to_be_bytes()); // sequence number
        buf.extend_from_slice(&9999u32.to_be_bytes()); // uptime
        buf.extend_from_slice(&sample_count.to_be_bytes());
        buf
    }

    #[test]
    fn decode_rejects_truncated_header() {
        let buf = vec![0u8; 3];
        assert_eq!(decode(&buf), Err(DecodeError::Truncated));
    }

    #[test]
    fn decode_rejects_unsupported_version() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u32.to_be_bytes());
        assert_eq!(decode(&buf), Err(DecodeError::UnsupportedVersion(4)));
    }

    #[test]
    fn decode_flow_sample_is_forwardable() {
        let mut buf = header(1);
        push_sample(&mut buf, 1, &[0xAA, 0xBB, 0xCC]);
        let packet = decode(&buf).expect("decode");
        assert_eq!(packet.samples, vec![SampleKind::FlowSample]);
        assert!(packet.has_forwardable_sample());
    }

    #[test]
    fn decode_counter_only_packet_is_not_forwardable() {
        let mut buf = header(1);
        push_sample(&mut buf, 2, &[0x01, 0x02]);
        let packet = decode(&buf).expect("decode");
        assert_eq!(packet.samples, vec![SampleKind::CounterSample]);
        assert!(!packet.has_forwardable_sample());
    }

    #[test]
    fn decode_expanded_flow_sample_is_forwardable() {
        let mut buf = header(1);
        push_sample(&mut buf, 3, &[0u8; 8]);
        let packet = decode(&buf).expect("decode");
        assert!(packet.has_forwardable_sample());
    }

    #[test]
    fn decode_mixed_samples_keeps_all_kinds() {
        let mut buf = header(2);
        push_sample(&mut buf, 2, &[0u8; 4]);
        push_sample(&mut buf, 1, &[0u8; 4]);
        let packet = decode(&buf).expect("decode");
        assert_eq!(packet.samples.len(), 2);
        assert!(packet.has_forwardable_sample());
    }

    #[test]
    fn decode_rejects_sample_overrun() {
        let mut buf = header(3);
        push_sample(&mut buf, 1, &[0u8; 4]);
        let packet = decode(&buf);
        assert_eq!(packet, Err(DecodeError::SampleOverrun));
    }
}
