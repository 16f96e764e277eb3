//! Fixed-width little-endian primitives used by every message.
//!
//! Strings are a `u32` byte length followed by the bytes. Readers never panic
//! on short input; they report [`DecodeError::Truncated`] instead.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::MsgType;

/// Upper bound for any string field; anything longer is treated as garbage.
pub const MAX_STRING_LEN: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated message: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("string length {0} exceeds limit")]
    StringTooLong(usize),
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("player id {0} out of range")]
    InvalidSlot(u8),
}

#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_tag(&mut self, tag: MsgType) -> &mut Self {
        self.buf.put_u8(tag as u8);
        self
    }

    pub fn put_byte(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(value as u8);
        self
    }

    /// Signed short; world coordinates and counters are clamped to fit.
    pub fn put_short(&mut self, value: i32) -> &mut Self {
        self.buf
            .put_i16_le(value.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        self
    }

    pub fn put_ushort(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn put_int(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn put_string(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let len = bytes.len().min(MAX_STRING_LEN);
        self.buf.put_u32_le(len as u32);
        self.buf.put_slice(&bytes[..len]);
        self
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Cursor over a received datagram.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < needed {
            return Err(DecodeError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Everything not consumed yet, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    pub fn get_byte(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Next tag byte, or `None` at a terminator or the end of the buffer.
    pub fn next_tag(&mut self) -> Option<u8> {
        if !self.buf.has_remaining() {
            return None;
        }
        let tag = self.buf.get_u8();
        if MsgType::is_terminator(tag) {
            None
        } else {
            Some(tag)
        }
    }

    pub fn get_short(&mut self) -> Result<i16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn get_ushort(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn get_int(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_string(&mut self) -> Result<String, DecodeError> {
        let len = self.get_int()? as usize;
        if len > MAX_STRING_LEN {
            return Err(DecodeError::StringTooLong(len));
        }
        self.ensure(len)?;
        let text = String::from_utf8_lossy(&self.buf[..len]).into_owned();
        self.buf.advance(len);
        Ok(text)
    }
}
