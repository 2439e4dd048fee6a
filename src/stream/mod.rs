//! Producer-to-relay wire protocol.
//!
//! One message per frame, never queued:
//!
//! ```text
//! [8-byte big-endian payload length]
//! [payload: 4-byte big-endian stats length | stats JSON | JPEG bytes]
//! ```
//!
//! Both the length and payload reads go through the same read-exactly-N
//! primitive; a short read at end-of-stream or an oversized length is a
//! connection fault for the caller to handle by reconnecting, never a parse
//! crash.

use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};

use crate::occupancy::OccupancyReport;

pub mod producer;
pub mod relay;

pub const LENGTH_PREFIX_BYTES: usize = 8;
const STATS_PREFIX_BYTES: usize = 4;

/// Upper bound on a single payload; anything larger is treated as a corrupt
/// stream rather than allocated.
pub const MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// One frame plus its statistics snapshot. Constructed immediately before
/// send, discarded after.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamMessage {
    pub stats: OccupancyReport,
    /// JPEG-compressed annotated frame.
    pub frame: Vec<u8>,
}

impl StreamMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let stats_json = serde_json::to_vec(&self.stats)?;
        let payload_len = STATS_PREFIX_BYTES + stats_json.len() + self.frame.len();
        let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload_len);
        out.extend_from_slice(&(payload_len as u64).to_be_bytes());
        out.extend_from_slice(&(stats_json.len() as u32).to_be_bytes());
        out.extend_from_slice(&stats_json);
        out.extend_from_slice(&self.frame);
        Ok(out)
    }
}

/// Serialize and send one message.
pub fn write_message<W: Write>(writer: &mut W, message: &StreamMessage) -> Result<()> {
    let bytes = message.encode()?;
    writer.write_all(&bytes).context("stream write failed")?;
    Ok(())
}

/// Framed reader over any byte stream. Blocks until each frame's bytes are
/// complete; the underlying transport's read timeout (if any) bounds the
/// wait.
pub struct FramedReader<R> {
    inner: R,
}

impl<R: Read> FramedReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read exactly `n` bytes. End-of-stream before `n` bytes is an error
    /// (the peer closed mid-message).
    fn read_exact_n(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner
            .read_exact(&mut buf)
            .context("connection closed mid-message")?;
        Ok(buf)
    }

    pub fn read_message(&mut self) -> Result<StreamMessage> {
        let prefix = self.read_exact_n(LENGTH_PREFIX_BYTES)?;
        let payload_len = u64::from_be_bytes(prefix.try_into().expect("fixed-size prefix"));
        if payload_len < STATS_PREFIX_BYTES as u64 || payload_len > MAX_PAYLOAD_BYTES {
            return Err(anyhow!("implausible payload length {}", payload_len));
        }
        let payload = self.read_exact_n(payload_len as usize)?;

        let stats_len =
            u32::from_be_bytes(payload[..STATS_PREFIX_BYTES].try_into().expect("prefix")) as usize;
        let stats_end = STATS_PREFIX_BYTES
            .checked_add(stats_len)
            .filter(|&end| end <= payload.len())
            .ok_or_else(|| anyhow!("stats length {} exceeds payload", stats_len))?;
        let stats: OccupancyReport = serde_json::from_slice(&payload[STATS_PREFIX_BYTES..stats_end])
            .context("malformed stats payload")?;
        Ok(StreamMessage {
            stats,
            frame: payload[stats_end..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn message() -> StreamMessage {
        StreamMessage {
            stats: OccupancyReport::from_counts(3, 2),
            frame: vec![0xFF, 0xD8, 0x01, 0x02],
        }
    }

    #[test]
    fn encode_then_read_round_trips() {
        let bytes = message().encode().unwrap();
        let mut reader = FramedReader::new(Cursor::new(bytes));
        let decoded = reader.read_message().unwrap();
        assert_eq!(decoded, message());
    }

    #[test]
    fn two_messages_back_to_back() {
        let mut bytes = message().encode().unwrap();
        let second = StreamMessage {
            stats: OccupancyReport::from_counts(3, 0),
            frame: Vec::new(),
        };
        bytes.extend_from_slice(&second.encode().unwrap());
        let mut reader = FramedReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_message().unwrap(), message());
        assert_eq!(reader.read_message().unwrap(), second);
    }

    #[test]
    fn truncated_payload_is_a_connection_fault() {
        let mut bytes = message().encode().unwrap();
        bytes.truncate(bytes.len() - 2);
        let mut reader = FramedReader::new(Cursor::new(bytes));
        assert!(reader.read_message().is_err());
    }

    #[test]
    fn truncated_length_prefix_is_a_connection_fault() {
        let bytes = vec![0u8; 3];
        let mut reader = FramedReader::new(Cursor::new(bytes));
        assert!(reader.read_message().is_err());
    }

    #[test]
    fn implausible_length_is_rejected_without_allocation() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        let mut reader = FramedReader::new(Cursor::new(bytes));
        assert!(reader.read_message().is_err());
    }

    #[test]
    fn stats_length_beyond_payload_is_rejected() {
        let stats_json = serde_json::to_vec(&OccupancyReport::default()).unwrap();
        let payload_len = 4 + stats_json.len();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(payload_len as u64).to_be_bytes());
        // Claim more stats bytes than the payload holds.
        bytes.extend_from_slice(&((stats_json.len() as u32) + 100).to_be_bytes());
        bytes.extend_from_slice(&stats_json);
        let mut reader = FramedReader::new(Cursor::new(bytes));
        assert!(reader.read_message().is_err());
    }
}
