// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Egress wire format for records handed to the bus client.
//!
//! A tiny tag+length framing, numbered so a future field can be added
//! without breaking readers that only understand the tags they expect:
//!
//! ```text
//! field(1, fixed 8-byte BE)         receive_timestamp_millis_utc
//! field(2, fixed 4-byte BE len + body) flow_payload
//! ```

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

const FIELD_TIMESTAMP: u8 = 1;
const FIELD_PAYLOAD: u8 = 2;

/// Errors produced while decoding a previously-framed record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated while reading field {0}")]
    Truncated(u8),

    #[error("unknown field tag {0}")]
    UnknownField(u8),

    #[error("missing required field {0}")]
    MissingField(u8),
}

/// A timestamped, framed flow record ready for the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedRecord {
    pub receive_timestamp_utc: DateTime<Utc>,
    pub flow_payload: Vec<u8>,
}

impl FramedRecord {
    pub fn new(receive_timestamp_utc: DateTime<Utc>, flow_payload: Vec<u8>) -> Self {
        Self {
            receive_timestamp_utc,
            flow_payload,
        }
    }

    /// Encode to the wire format.
    pub fn encode(&self) -> Vec<u8> {
        let millis = self.receive_timestamp_utc.timestamp_millis();
        let mut out = Vec::with_capacity(1 + 8 + 1 + 4 + self.flow_payload.len());

        out.push(FIELD_TIMESTAMP);
        out.extend_from_slice(&millis.to_be_bytes());

        out.push(FIELD_PAYLOAD);
        out.extend_from_slice(&(self.flow_payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.flow_payload);

        out
    }

    /// Decode a previously-encoded frame, skipping any field whose tag
    /// is not recognized so future additive fields don't break old
    /// readers.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let mut pos = 0usize;
        let mut timestamp: Option<DateTime<Utc>> = None;
        let mut payload: Option<Vec<u8>> = None;

        while pos < buf.len() {
            let tag = buf[pos];
            pos += 1;
            match tag {
                FIELD_TIMESTAMP => {
                    if pos + 8 > buf.len() {
                        return Err(FrameError::Truncated(tag));
                    }
                    let bytes: [u8; 8] = buf[pos..pos + 8].try_into().unwrap();
                    pos += 8;
                    let millis = i64::from_be_bytes(bytes);
                    timestamp = Some(
                        Utc.timestamp_millis_opt(millis)
                            .single()
                            .unwrap_or_else(Utc::now),
                    );
                }
                FIELD_PAYLOAD => {
                    if pos + 4 > buf.len() {
                        return Err(FrameError::Truncated(tag));
                    }
                    let len_bytes: [u8; 4] = buf[pos..pos + 4].try_into().unwrap();
                    pos += 4;
                    let len = u32::from_be_bytes(len_bytes) as usize;
                    if pos + len > buf.len() {
                        return Err(FrameError::Truncated(tag));
                    }
                    payload = Some(buf[pos..pos + len].to_vec());
                    pos += len;
                }
                other => return Err(FrameError::UnknownField(other)),
            }
        }

        Ok(Self {
            receive_timestamp_utc: timestamp.ok_or(FrameError::MissingField(FIELD_TIMESTAMP))?,
            flow_payload: payload.ok_or(FrameError::MissingField(FIELD_PAYLOAD))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let record = FramedRecord::new(Utc::now(), vec![1, 2, 3, 4, 5]);
        let encoded = record.encode();
        let decoded = FramedRecord::decode(&encoded).expect("decode");
        assert_eq!(decoded.flow_payload, record.flow_payload);
        assert_eq!(
            decoded.receive_timestamp_utc.timestamp_millis(),
            record.receive_timestamp_utc.timestamp_millis()
        );
    }

    #[test]
    fn decode_rejects_truncated_payload_length() {
        let mut buf = vec![FIELD_TIMESTAMP];
        buf.extend_from_slice(&0i64.to_be_bytes());
        buf.push(FIELD_PAYLOAD);
        buf.extend_from_slice(&100u32.to_be_bytes());
        buf.extend_from_slice(&[1, 2]);
        assert_eq!(FramedRecord::decode(&buf), Err(FrameError::Truncated(FIELD_PAYLOAD)));
    }

    #[test]
    fn decode_rejects_missing_payload_field() {
        let mut buf = vec![FIELD_TIMESTAMP];
        buf.extend_from_slice(&0i64.to_be_bytes());
        assert_eq!(
            FramedRecord::decode(&buf),
            Err(FrameError::MissingField(FIELD_PAYLOAD))
        );
    }

    #[test]
    fn decode_rejects_unknown_field_tag() {
        let buf = vec![9u8, 0, 0, 0, 0];
        assert_eq!(FramedRecord::decode(&buf), Err(FrameError::UnknownField(9)));
    }
}
