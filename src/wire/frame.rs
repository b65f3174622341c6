//! Frames and the read-side frame buffer.
//!
//! [`FrameBuffer`] accumulates partial socket reads in a `BytesMut` and
//! yields complete frames. It is a two-state machine:
//! - waiting for a header (needs 11 bytes)
//! - waiting for the payload (header parsed, needs N more bytes)

use bytes::{Bytes, BytesMut};

use super::header::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::{PmpError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }
}

#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a buffer with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a buffer rejecting payloads above `max_payload_size`.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push. Fails on a header that
    /// violates the protocol; the buffer is unusable afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let Some(header) = Header::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    header.validate(self.max_payload_size)?;
                    let _ = self.buffer.split_to(HEADER_SIZE);

                    if header.payload_length == 0 {
                        return Ok(Some(Frame::new(header, Bytes::new())));
                    }
                    self.state = State::WaitingForPayload { header };
                }
                State::WaitingForPayload { header } => {
                    let length = header.payload_length as usize;
                    if self.buffer.len() < length {
                        return Ok(None);
                    }
                    let payload = self.buffer.split_to(length).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(Frame::new(header, payload)));
                }
            }
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a full frame (header + payload) into one contiguous buffer.
pub fn encode_frame(op_id: u16, flags: u8, request_id: u32, payload: &[u8]) -> Result<Bytes> {
    let length = u32::try_from(payload.len())
        .map_err(|_| PmpError::Protocol(format!("Payload of {} bytes too large", payload.len())))?;
    let header = Header::new(op_id, flags, request_id, length);

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::header::flags;

    #[test]
    fn test_fragmented_frame() {
        let bytes = encode_frame(3, 0, 9, b"hello").unwrap();
        let mut buffer = FrameBuffer::new();

        assert!(buffer.push(&bytes[..4]).unwrap().is_empty());
        assert!(buffer.push(&bytes[4..13]).unwrap().is_empty());
        let frames = buffer.push(&bytes[13..]).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.op_id, 3);
        assert_eq!(frames[0].request_id(), 9);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut data = encode_frame(1, flags::RESPONSE, 1, b"a").unwrap().to_vec();
        data.extend_from_slice(&encode_frame(2, flags::RESPONSE, 2, b"").unwrap());
        data.extend_from_slice(&encode_frame(3, flags::RESPONSE, 3, b"ccc").unwrap()[..12]);

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].payload().is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut buffer = FrameBuffer::with_max_payload(4);
        let bytes = encode_frame(1, 0, 1, b"too long").unwrap();
        assert!(matches!(buffer.push(&bytes), Err(PmpError::Protocol(_))));
    }
}
