use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ChannelError, Result};

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "RT" (0x52 0x54).
pub const MAGIC: [u8; 2] = [0x52, 0x54];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode one message payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────────────┐
/// │ Magic (2B)   │ Length    │ Payload               │
/// │ 0x52 0x54    │ (4B LE)  │ (Length bytes, JSON)  │
/// │ "RT"         │          │                       │
/// └──────────────┴───────────┴──────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(ChannelError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame payload from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(ChannelError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if payload_len > max_payload {
        return Err(ChannelError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Configuration for framed channels.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// `tokio_util` codec for JSON message frames.
///
/// Decoding yields raw payload bytes so that a frame holding invalid JSON can
/// be skipped without tearing down the stream.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: ChannelConfig,
}

impl MessageCodec {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Encode a message without going through a `tokio_util` sink.
    pub fn encode_message(&self, message: &serde_json::Value, dst: &mut BytesMut) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.check_outbound(payload.len())?;
        encode_frame(&payload, dst)
    }

    fn check_outbound(&self, len: usize) -> Result<()> {
        if len > self.config.max_payload_size {
            return Err(ChannelError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }
}

#[cfg(feature = "stream")]
impl tokio_util::codec::Decoder for MessageCodec {
    type Item = Bytes;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        decode_frame(src, self.config.max_payload_size)
    }
}

#[cfg(feature = "stream")]
impl tokio_util::codec::Encoder<serde_json::Value> for MessageCodec {
    type Error = ChannelError;

    fn encode(&mut self, item: serde_json::Value, dst: &mut BytesMut) -> Result<()> {
        self.encode_message(&item, dst)
    }
}
