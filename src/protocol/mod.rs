//! Protocol module - serial command set and reply framing.
//!
//! This module implements the text/binary protocol spoken by the camera board:
//! - Command encoding (`getimage`, `getline`, `regr`, `regw`)
//! - Reply parser for fixed-size and `\n`-delimited replies
//! - Register reply decoding

mod command;
mod framing;

pub use command::{parse_register_reply, Command, RegisterValue, ERROR_REPLY};
pub use framing::{Framing, ReplyParser};
