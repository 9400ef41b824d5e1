//! Reply parser for the serial link.
//!
//! The camera answers each command with one reply, framed one of two ways:
//! - `FixedSize(n)`: exactly `n` raw bytes (image lines)
//! - `Delimited`: text terminated by `\n`, with every `\r` dropped
//!
//! The parser is a byte-at-a-time state machine:
//! - `Idle`: no reply expected, incoming bytes are stray
//! - `AwaitingFixedSize`: counting down the remaining bytes
//! - `AwaitingDelimiter`: accumulating until `\n`
//!
//! # Example
//!
//! ```
//! use camview_client::protocol::{Framing, ReplyParser};
//!
//! let mut parser = ReplyParser::new();
//! parser.begin(Framing::Delimited).unwrap();
//!
//! let mut reply = None;
//! for &byte in b"OK\r\n" {
//!     if let Some(done) = parser.feed(byte) {
//!         reply = Some(done);
//!     }
//! }
//! assert_eq!(&reply.unwrap()[..], b"OK");
//! assert!(parser.is_idle());
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{CamviewError, Result};

/// How the end of a reply is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Reply is exactly this many bytes.
    FixedSize(usize),
    /// Reply ends at `\n`; `\r` is dropped.
    Delimited,
}

impl Framing {
    /// Pick framing from an optional expected size.
    ///
    /// `None` and `Some(0)` both mean delimiter framing.
    pub fn from_expected(expected_size: Option<usize>) -> Self {
        match expected_size {
            Some(n) if n > 0 => Framing::FixedSize(n),
            _ => Framing::Delimited,
        }
    }
}

/// State machine for reply parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing outstanding.
    Idle,
    /// Counting raw bytes.
    AwaitingFixedSize { remaining: usize },
    /// Scanning for `\n`.
    AwaitingDelimiter,
}

/// Accumulates bytes for the single outstanding reply.
#[derive(Debug)]
pub struct ReplyParser {
    /// Bytes of the reply collected so far.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Bytes that arrived while idle.
    unhandled: u64,
}

impl ReplyParser {
    /// Create an idle parser.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(512),
            state: State::Idle,
            unhandled: 0,
        }
    }

    /// Start expecting a reply with the given framing.
    ///
    /// Fails with `ConversationInProgress` if a reply is already expected; the
    /// parser is left untouched in that case.
    pub fn begin(&mut self, framing: Framing) -> Result<()> {
        if self.state != State::Idle {
            return Err(CamviewError::ConversationInProgress);
        }

        self.buffer.clear();
        self.state = match framing {
            Framing::FixedSize(0) | Framing::Delimited => State::AwaitingDelimiter,
            Framing::FixedSize(n) => State::AwaitingFixedSize { remaining: n },
        };
        Ok(())
    }

    /// Consume one byte of the live stream.
    ///
    /// Returns the completed reply when this byte finishes it. Bytes that
    /// arrive while idle are logged and discarded.
    pub fn feed(&mut self, byte: u8) -> Option<Bytes> {
        match self.state {
            State::Idle => {
                self.unhandled += 1;
                tracing::warn!("Unhandled data: [{:#04x}]", byte);
                None
            }

            State::AwaitingFixedSize { remaining } => {
                self.buffer.extend_from_slice(&[byte]);
                let remaining = remaining - 1;
                if remaining == 0 {
                    Some(self.finish())
                } else {
                    self.state = State::AwaitingFixedSize { remaining };
                    None
                }
            }

            State::AwaitingDelimiter => match byte {
                b'\r' => None,
                b'\n' => Some(self.finish()),
                other => {
                    self.buffer.extend_from_slice(&[other]);
                    None
                }
            },
        }
    }

    /// Complete the outstanding reply with whatever has accumulated.
    ///
    /// Returns `None` if the parser was already idle.
    pub fn force_complete(&mut self) -> Option<Bytes> {
        if self.state == State::Idle {
            return None;
        }
        Some(self.finish())
    }

    /// Check if no reply is expected.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Number of bytes accumulated for the outstanding reply.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of stray bytes seen so far.
    #[inline]
    pub fn unhandled_count(&self) -> u64 {
        self.unhandled
    }

    /// Drop any partial reply and go idle.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = State::Idle;
    }

    fn finish(&mut self) -> Bytes {
        self.state = State::Idle;
        self.buffer.split().freeze()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Idle => "Idle",
            State::AwaitingFixedSize { .. } => "AwaitingFixedSize",
            State::AwaitingDelimiter => "AwaitingDelimiter",
        }
    }
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut ReplyParser, data: &[u8]) -> Vec<Bytes> {
        data.iter().filter_map(|&b| parser.feed(b)).collect()
    }

    #[test]
    fn test_fixed_size_exact() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::FixedSize(5)).unwrap();

        let replies = feed_all(&mut parser, b"ab\r\nc");

        assert_eq!(replies.len(), 1);
        assert_eq!(&replies[0][..], b"ab\r\nc");
        assert!(parser.is_idle());
        assert_eq!(parser.unhandled_count(), 0);
    }

    #[test]
    fn test_fixed_size_does_not_consume_extra() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::FixedSize(3)).unwrap();

        let replies = feed_all(&mut parser, b"xyzEXTRA");

        assert_eq!(replies.len(), 1);
        assert_eq!(&replies[0][..], b"xyz");
        assert_eq!(parser.unhandled_count(), 5);
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_fixed_size_all_byte_values() {
        let payload: Vec<u8> = (0..=255).chain(0..64).collect();
        let mut parser = ReplyParser::new();
        parser.begin(Framing::FixedSize(payload.len())).unwrap();

        let replies = feed_all(&mut parser, &payload);

        assert_eq!(replies.len(), 1);
        assert_eq!(&replies[0][..], &payload[..]);
    }

    #[test]
    fn test_fixed_size_partial_stays_pending() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::FixedSize(320)).unwrap();

        let replies = feed_all(&mut parser, &[0xAA; 100]);

        assert!(replies.is_empty());
        assert_eq!(parser.state_name(), "AwaitingFixedSize");
        assert_eq!(parser.buffered(), 100);
    }

    #[test]
    fn test_delimited_drops_cr() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::Delimited).unwrap();

        let replies = feed_all(&mut parser, b"0x\r12 \r0x80\r\n");

        assert_eq!(replies.len(), 1);
        assert_eq!(&replies[0][..], b"0x12 0x80");
    }

    #[test]
    fn test_delimited_first_newline_terminates() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::Delimited).unwrap();

        let replies = feed_all(&mut parser, b"OK\nMORE\n");

        assert_eq!(replies.len(), 1);
        assert_eq!(&replies[0][..], b"OK");
        assert!(parser.is_idle());
        assert_eq!(parser.unhandled_count(), 5);
    }

    #[test]
    fn test_delimited_empty_line() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::Delimited).unwrap();

        let replies = feed_all(&mut parser, b"\r\n");

        assert_eq!(replies.len(), 1);
        assert!(replies[0].is_empty());
    }

    #[test]
    fn test_idle_bytes_are_unhandled() {
        let mut parser = ReplyParser::new();

        assert!(parser.feed(b'x').is_none());
        assert!(parser.feed(b'\n').is_none());

        assert_eq!(parser.unhandled_count(), 2);
        assert_eq!(parser.state_name(), "Idle");
    }

    #[test]
    fn test_begin_while_pending_fails() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::FixedSize(4)).unwrap();
        parser.feed(1);

        let result = parser.begin(Framing::Delimited);

        assert!(matches!(result, Err(CamviewError::ConversationInProgress)));
        assert_eq!(parser.state_name(), "AwaitingFixedSize");
        assert_eq!(parser.buffered(), 1);
    }

    #[test]
    fn test_force_complete_returns_partial() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::FixedSize(320)).unwrap();
        feed_all(&mut parser, &[7u8; 100]);

        let reply = parser.force_complete().unwrap();

        assert_eq!(reply.len(), 100);
        assert!(reply.iter().all(|&b| b == 7));
        assert!(parser.is_idle());
        assert!(parser.force_complete().is_none());
    }

    #[test]
    fn test_force_complete_with_nothing_received() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::Delimited).unwrap();

        let reply = parser.force_complete().unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn test_framing_from_expected() {
        assert_eq!(Framing::from_expected(None), Framing::Delimited);
        assert_eq!(Framing::from_expected(Some(0)), Framing::Delimited);
        assert_eq!(Framing::from_expected(Some(320)), Framing::FixedSize(320));
    }

    #[test]
    fn test_reset_clears_partial() {
        let mut parser = ReplyParser::new();
        parser.begin(Framing::Delimited).unwrap();
        feed_all(&mut parser, b"partial");

        parser.reset();

        assert!(parser.is_idle());
        assert_eq!(parser.buffered(), 0);
    }
}
