//! Frame header encoding and decoding.
//!
//! Every frame starts with an 11-byte header:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Op ID    │ Flags │ Req ID   │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{PmpError, Result};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Flag bits.
pub mod flags {
    /// Frame answers an earlier request.
    pub const RESPONSE: u8 = 0b0000_0001;
    /// The answer is a failure.
    pub const ERROR: u8 = 0b0000_0010;
    /// Handshake frame sent by the host on accept.
    pub const HELLO: u8 = 0b0000_0100;

    /// Bits that must stay zero.
    pub const RESERVED_MASK: u8 = 0b1111_1000;

    /// Error response: `RESPONSE | ERROR`.
    pub const ERROR_RESPONSE: u8 = RESPONSE | ERROR;

    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Remote operation this frame carries.
    pub op_id: u16,
    /// Flags byte (see [`flags`]).
    pub flags: u8,
    /// Correlates a response with its request (0 for the handshake).
    pub request_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a header.
    pub fn new(op_id: u16, flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            op_id,
            flags,
            request_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use pmp_ipc::wire::{flags, Header};
    ///
    /// let header = Header::new(3, flags::RESPONSE, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 11);
    /// assert_eq!(Header::decode(&bytes), Some(header));
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.op_id.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.request_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes. Returns `None` if `buf` is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            op_id: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            request_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Check payload size and reserved bits.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(PmpError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(PmpError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::RESPONSE)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::ERROR)
    }

    #[inline]
    pub fn is_hello(&self) -> bool {
        flags::has_flag(self.flags, flags::HELLO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let header = Header::new(0x0102, flags::ERROR_RESPONSE, 0x0A0B_0C0D, 0x0000_0100);
        assert_eq!(
            header.encode(),
            [0x01, 0x02, 0x03, 0x0A, 0x0B, 0x0C, 0x0D, 0x00, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn test_decode_short_buffer() {
        assert_eq!(Header::decode(&[0u8; 10]), None);
    }

    #[test]
    fn test_flag_accessors() {
        let hello = Header::new(0, flags::HELLO, 0, 4);
        assert!(hello.is_hello());
        assert!(!hello.is_response());

        let failed = Header::new(2, flags::ERROR_RESPONSE, 7, 0);
        assert!(failed.is_response());
        assert!(failed.is_error());
    }

    #[test]
    fn test_validate() {
        assert!(Header::new(1, 0, 1, 10).validate(10).is_ok());
        assert!(Header::new(1, 0, 1, 11).validate(10).is_err());
        assert!(Header::new(1, 0b1000_0000, 1, 0).validate(10).is_err());
    }
}
