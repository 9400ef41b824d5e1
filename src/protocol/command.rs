//! Serial command set.
//!
//! Commands are ASCII, terminated by a single `\r`:
//! ```text
//! getimage\r                 -> "OK\r\n"            (delimited)
//! getline {y}\r              -> 320 raw bytes        (fixed size)
//! regr 0x{aa}\r              -> "0x{aa} 0x{vv}\r\n"  (delimited)
//! regw 0x{aa} 0x{vv}\r       -> "0x{aa} 0x{vv}\r\n"  (delimited)
//! ```
//!
//! The firmware answers anything it does not recognise with `ERR\r\n`.

use bytes::Bytes;

use super::framing::Framing;
use crate::error::{CamviewError, Result};
use crate::frame::{LINE_BYTES, LINE_COUNT};

/// Error reply text sent by the firmware.
pub const ERROR_REPLY: &[u8] = b"ERR";

/// A command understood by the camera firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Capture a new frame into the device's buffer.
    GetImage,
    /// Fetch one scan line of the captured frame.
    GetLine(u16),
    /// Read a sensor register.
    ReadRegister(u8),
    /// Write a sensor register.
    WriteRegister(u8, u8),
}

impl Command {
    /// Build a line request, checking the index against the frame height.
    pub fn get_line(index: usize) -> Result<Self> {
        if index >= LINE_COUNT {
            return Err(CamviewError::Protocol(format!(
                "Line index {} out of range (0..{})",
                index, LINE_COUNT
            )));
        }
        Ok(Command::GetLine(index as u16))
    }

    /// Encode to the exact bytes written on the wire.
    ///
    /// # Example
    ///
    /// ```
    /// use camview_client::protocol::Command;
    ///
    /// assert_eq!(&Command::GetLine(7).encode()[..], b"getline 7\r");
    /// assert_eq!(&Command::WriteRegister(0x12, 0x80).encode()[..], b"regw 0x12 0x80\r");
    /// ```
    pub fn encode(&self) -> Bytes {
        let text = match self {
            Command::GetImage => "getimage\r".to_string(),
            Command::GetLine(y) => format!("getline {}\r", y),
            Command::ReadRegister(addr) => format!("regr 0x{:02x}\r", addr),
            Command::WriteRegister(addr, value) => format!("regw 0x{:02x} 0x{:02x}\r", addr, value),
        };
        Bytes::from(text)
    }

    /// How the reply to this command is framed.
    pub fn framing(&self) -> Framing {
        match self {
            Command::GetLine(_) => Framing::FixedSize(LINE_BYTES),
            _ => Framing::Delimited,
        }
    }

    /// Expected reply size, if the reply is fixed size.
    pub fn expected_size(&self) -> Option<usize> {
        match self.framing() {
            Framing::FixedSize(n) => Some(n),
            Framing::Delimited => None,
        }
    }
}

/// A register address/value pair as echoed by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue {
    /// Register address.
    pub addr: u8,
    /// Register contents.
    pub value: u8,
}

/// Parse a `regr`/`regw` reply of the form `0x{aa} 0x{vv}`.
pub fn parse_register_reply(reply: &[u8]) -> Result<RegisterValue> {
    if reply.is_empty() {
        return Err(CamviewError::Protocol("No register reply".into()));
    }
    if reply == ERROR_REPLY {
        return Err(CamviewError::Protocol("Device rejected register command".into()));
    }

    let text = std::str::from_utf8(reply)
        .map_err(|_| CamviewError::Protocol("Register reply is not ASCII".into()))?;

    let mut fields = text.split_whitespace();
    let (addr, value) = match (fields.next(), fields.next(), fields.next()) {
        (Some(addr), Some(value), None) => (parse_hex_byte(addr)?, parse_hex_byte(value)?),
        _ => {
            return Err(CamviewError::Protocol(format!(
                "Malformed register reply: {:?}",
                text
            )))
        }
    };

    Ok(RegisterValue { addr, value })
}

fn parse_hex_byte(field: &str) -> Result<u8> {
    let digits = field
        .strip_prefix("0x")
        .ok_or_else(|| CamviewError::Protocol(format!("Expected 0x prefix in {:?}", field)))?;
    u8::from_str_radix(digits, 16)
        .map_err(|_| CamviewError::Protocol(format!("Invalid hex byte {:?}", field)))
}
