//! Wire protocol codec for Unix domain socket IPC.
//!
//! Length-prefixed JSON frames:
//!
//! ```text
//! [u32 LE length] [payload: length bytes]
//! ```
//!
//! The payload is a JSON object `{"key": <routing key>, "packet": {...}}`.
//! The key addresses the frame (see [`crate::keys`]); the packet is the
//! envelope of [`crate::packet::Packet`]. There is exactly one frame kind —
//! every message in the network, request or reply, travels this way.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::packet::Packet;

/// Maximum frame payload size (16 MB).
const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// A keyed packet as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Routing key addressing this frame.
    pub key: String,
    /// The message envelope.
    pub packet: Packet,
}

impl Frame {
    /// Create a frame from a key and packet.
    pub fn new(key: impl Into<String>, packet: Packet) -> Self {
        Self {
            key: key.into(),
            packet,
        }
    }

    /// Encode this frame into a wire-format byte vector.
    ///
    /// Returns `[u32 LE length][JSON payload]`.
    pub fn encode(&self) -> Vec<u8> {
        let payload = serde_json::to_vec(self).expect("JSON serialization cannot fail");
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf
    }
}

/// Incremental frame decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and extract complete frames.
/// Handles stream-style byte reassembly.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and extract all complete frames.
    ///
    /// Incomplete data is buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame is malformed or exceeds the size limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            // Need at least 4 bytes for the length header
            if self.buf.len() < 4 {
                break;
            }

            let length = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);

            if length == 0 {
                bail!("Invalid frame: zero length");
            }
            if length > MAX_FRAME_SIZE {
                bail!("Frame too large: {length} bytes (max {MAX_FRAME_SIZE})");
            }

            let total = 4 + length as usize;
            if self.buf.len() < total {
                break; // Incomplete frame, wait for more data
            }

            let frame: Frame = serde_json::from_slice(&self.buf[4..total])
                .map_err(|e| anyhow!("Invalid JSON frame: {e}"))?;
            frames.push(frame);

            self.buf.drain(..total);
        }

        Ok(frames)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_frame() -> Frame {
        Frame::new(
            "samcore.helloWorld",
            Packet::new("alice", "samcore", "helloWorld", json!({"text": "there"}))
                .with_return_code(1700000000000),
        )
    }

    #[test]
    fn test_round_trip() {
        let frame = sample_frame();
        let encoded = frame.encode();
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&encoded).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], frame);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_multiple_frames_in_single_feed() {
        let f1 = sample_frame();
        let f2 = Frame::new("alice.message", Packet::default());
        let f3 = Frame::new("samcore.greenLight", Packet::new("bob", "samcore", "greenLight", json!({})));

        let mut buf = Vec::new();
        buf.extend_from_slice(&f1.encode());
        buf.extend_from_slice(&f2.encode());
        buf.extend_from_slice(&f3.encode());

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&buf).unwrap();
        assert_eq!(frames, vec![f1, f2, f3]);
    }

    #[test]
    fn test_partial_frame_reassembly() {
        let frame = sample_frame();
        let encoded = frame.encode();

        let mut decoder = FrameDecoder::new();
        let mid = encoded.len() / 2;
        assert!(decoder.feed(&encoded[..mid]).unwrap().is_empty());
        assert!(decoder.has_partial());

        let frames = decoder.feed(&encoded[mid..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], frame);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_byte_at_a_time() {
        let frame = sample_frame();
        let encoded = frame.encode();

        let mut decoder = FrameDecoder::new();
        for (i, byte) in encoded.iter().enumerate() {
            let frames = decoder.feed(&[*byte]).unwrap();
            if i < encoded.len() - 1 {
                assert!(frames.is_empty());
            } else {
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0], frame);
            }
        }
    }

    #[test]
    fn test_zero_length_rejected() {
        let buf = [0u8; 4]; // length = 0
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&buf).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let length = MAX_FRAME_SIZE + 1;
        let buf = length.to_le_bytes();
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&buf).is_err());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let payload = b"not json at all";
        let mut buf = Vec::new();
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&buf).is_err());
    }

    #[test]
    fn test_packet_defaults_fill_on_receipt() {
        // A hand-rolled minimal frame (missing most packet fields) must
        // decode with defaults per the packet contract.
        let payload = br#"{"key": "samcore.greenLight", "packet": {}}"#;
        let mut buf = Vec::new();
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&buf).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].packet.status);
        assert_eq!(frames[0].packet.args, json!({}));
    }
}
