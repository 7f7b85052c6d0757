//! WebRcon wire protocol: frames and message types.
//!
//! Every exchange with the remote console is a length-prefixed frame:
//!
//! 1. **Length** (2 bytes, big-endian): byte count of type + payload
//! 2. **Type** (1 byte): see [`MessageType`]
//! 3. **Payload**: message-specific fields (see [`codec`])
//!
//! Integers travel big-endian; strings are UTF-32 with a byte-length prefix
//! equal to `codepoint_count * 4`. Parsing is fully bounds-checked: a
//! truncated buffer is a [`MalformedFrame`](crate::GatherError::MalformedFrame)
//! error and an unrecognized type code is an explicit `None` from
//! [`RawFrame::kind`]: neither ever panics.

mod codec;

pub use codec::{MessageReader, MessageWriter};

use crate::{GatherError, Result};

/// Size of the frame header: 2-byte length + 1-byte type.
pub const FRAME_HEADER_SIZE: usize = 3;

/// Message type codes of the remote console protocol.
///
/// The numeric values must match the remote server exactly; they are
/// centralized here so an interoperability fix touches one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Login = 0,
    SetState = 1,
    Error = 2,
    LoginOk = 3,
    NewTab = 4,
    LogLine = 5,
    Command = 6,
    CommandInfo = 7,
    CloseTab = 8,
}

impl MessageType {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a type code. Unknown codes are a normal outcome (newer server
    /// builds emit types we do not know), handled by the caller.
    pub fn from_code(code: u8) -> Option<MessageType> {
        match code {
            0 => Some(MessageType::Login),
            1 => Some(MessageType::SetState),
            2 => Some(MessageType::Error),
            3 => Some(MessageType::LoginOk),
            4 => Some(MessageType::NewTab),
            5 => Some(MessageType::LogLine),
            6 => Some(MessageType::Command),
            7 => Some(MessageType::CommandInfo),
            8 => Some(MessageType::CloseTab),
            _ => None,
        }
    }
}

/// A decoded frame: raw type code plus payload bytes.
///
/// The code is kept raw so unknown types survive decoding and can be logged
/// with their numeric value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub code: u8,
    pub payload: Vec<u8>,
}

impl RawFrame {
    /// Parse a complete frame from a buffer (header included).
    pub fn parse(buf: &[u8]) -> Result<RawFrame> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(GatherError::malformed_frame(
                "frame header",
                format!("{} bytes, need at least {}", buf.len(), FRAME_HEADER_SIZE),
            ));
        }
        let length = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if length < 1 {
            return Err(GatherError::malformed_frame("frame header", "zero-length frame"));
        }
        if buf.len() != 2 + length {
            return Err(GatherError::malformed_frame(
                "frame body",
                format!("declared {} bytes, buffer holds {}", length, buf.len() - 2),
            ));
        }
        Ok(RawFrame { code: buf[2], payload: buf[3..].to_vec() })
    }

    /// The recognized message type, if any.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_code(self.code)
    }

    /// Decode the payload as a single UTF-32 string field.
    pub fn text(&self) -> Result<String> {
        let mut reader = MessageReader::new(&self.payload);
        reader.read_string()
    }
}
