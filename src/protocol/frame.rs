//! Stream frame encoding and decoding.
//!
//! The wire format is the Meshtastic serial stream framing:
//! ```text
//! ┌────────┬────────┬─────────────┬─────────────┐
//! │  0x94  │  0xc3  │  size (BE)  │   payload   │
//! │ 1 byte │ 1 byte │   2 bytes   │  size bytes │
//! └────────┴────────┴─────────────┴─────────────┘
//! ```
//!
//! Serial links emit boot noise and log text between frames, so the
//! decoder scans forward to the next sync pair instead of failing on
//! unexpected bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// First sync byte.
pub const START1: u8 = 0x94;

/// Second sync byte.
pub const START2: u8 = 0xc3;

/// Maximum frame payload size.
pub const MAX_FRAME_SIZE: usize = 512;

/// Frame header size (two sync bytes plus big-endian u16 length).
pub const HEADER_SIZE: usize = 4;

/// Encodes a payload into a framed message.
///
/// # Panics
///
/// Panics if the payload exceeds [`MAX_FRAME_SIZE`].
#[must_use]
pub fn encode(payload: &[u8]) -> Bytes {
    assert!(
        payload.len() <= MAX_FRAME_SIZE,
        "payload exceeds maximum frame size"
    );

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u8(START1);
    buf.put_u8(START2);
    buf.put_u16(u16::try_from(payload.len()).expect("length checked above"));
    buf.put_slice(payload);
    buf.freeze()
}

/// Frame decoder that handles partial data and inter-frame noise.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Creates a new frame decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    ///
    /// Returns `Ok(Some(payload))` if a complete frame was decoded and
    /// `Ok(None)` if more data is needed. Bytes before the next sync pair
    /// are discarded silently.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if a sync pair announces a
    /// length above [`MAX_FRAME_SIZE`]; the bogus sync pair is dropped so
    /// the next call resynchronizes.
    pub fn decode(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        self.skip_to_sync();

        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let length = u16::from_be_bytes([self.buffer[2], self.buffer[3]]) as usize;
        if length > MAX_FRAME_SIZE {
            // Not a real header; drop the sync pair and rescan.
            self.buffer.advance(2);
            return Err(ProtocolError::Malformed {
                reason: format!("frame length {length} exceeds maximum {MAX_FRAME_SIZE}"),
            });
        }

        if self.buffer.len() < HEADER_SIZE + length {
            return Ok(None);
        }

        self.buffer.advance(HEADER_SIZE);
        Ok(Some(self.buffer.split_to(length).freeze()))
    }

    /// Drops leading bytes until the buffer starts with a sync pair (or
    /// could still become one).
    fn skip_to_sync(&mut self) {
        while !self.buffer.is_empty() {
            if self.buffer[0] == START1 {
                if self.buffer.len() == 1 || self.buffer[1] == START2 {
                    return;
                }
                self.buffer.advance(1);
            } else {
                self.buffer.advance(1);
            }
        }
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
