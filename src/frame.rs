//! Frame geometry, scan lines and the published frame handle.
//!
//! A frame is 120 lines of 160 RGB565 pixels (320 bytes per line). The
//! assembler builds a working [`FrameBuffer`] line by line and hands it to a
//! [`FramePublisher`] once complete. Renderers hold a [`FrameWatch`] and only
//! ever see whole frames: publication is a single `Arc` swap inside a
//! `tokio::sync::watch` channel.
//!
//! # Example
//!
//! ```
//! use camview_client::frame::{frame_channel, FrameBuffer, FrameLine};
//!
//! let (publisher, watch) = frame_channel();
//! assert_eq!(*watch.current(), FrameBuffer::zeroed());
//!
//! let mut next = FrameBuffer::zeroed();
//! next.set_line(3, FrameLine::from_reply(&[0xFF; 320]).unwrap()).unwrap();
//! publisher.publish(next.clone());
//!
//! assert_eq!(*watch.current(), next);
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{CamviewError, Result};

/// Logical frame width in pixels.
pub const FRAME_WIDTH: usize = 160;

/// Number of scan lines per frame.
pub const LINE_COUNT: usize = 120;

/// RGB565 is two bytes per pixel.
pub const BYTES_PER_PIXEL: usize = 2;

/// Bytes in one scan line (exactly 320).
pub const LINE_BYTES: usize = FRAME_WIDTH * BYTES_PER_PIXEL;

/// One scan line of exactly [`LINE_BYTES`] bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameLine([u8; LINE_BYTES]);

impl FrameLine {
    /// A line of zero bytes.
    pub const fn zeroed() -> Self {
        Self([0u8; LINE_BYTES])
    }

    /// Build a line from a reply, if the reply has exactly the right length.
    pub fn from_reply(reply: &[u8]) -> Option<Self> {
        let bytes: [u8; LINE_BYTES] = reply.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Raw line bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for FrameLine {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for FrameLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameLine({:02x?}..)", &self.0[..8])
    }
}

/// A full frame: always [`LINE_COUNT`] lines, never resized.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    lines: Vec<FrameLine>,
}

impl FrameBuffer {
    /// The all-zero frame used before anything has been fetched.
    pub fn zeroed() -> Self {
        Self {
            lines: vec![FrameLine::zeroed(); LINE_COUNT],
        }
    }

    /// Get a line by index.
    ///
    /// Returns `None` for an index outside `0..LINE_COUNT`.
    #[inline]
    pub fn line(&self, index: usize) -> Option<&FrameLine> {
        self.lines.get(index)
    }

    /// Replace the line at `index`.
    pub fn set_line(&mut self, index: usize, line: FrameLine) -> Result<()> {
        let slot = self.lines.get_mut(index).ok_or_else(|| {
            CamviewError::Protocol(format!(
                "Line index {} out of range (0..{})",
                index, LINE_COUNT
            ))
        })?;
        *slot = line;
        Ok(())
    }

    /// Iterate over lines top to bottom.
    pub fn lines(&self) -> impl Iterator<Item = &FrameLine> {
        self.lines.iter()
    }

    /// Number of lines (always [`LINE_COUNT`]).
    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false; present for API symmetry with `len`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("lines", &self.lines.len())
            .finish()
    }
}

/// Create a publisher/watch pair, starting from the all-zero frame.
pub fn frame_channel() -> (FramePublisher, FrameWatch) {
    let (tx, rx) = watch::channel(Arc::new(FrameBuffer::zeroed()));
    (FramePublisher { tx }, FrameWatch { rx })
}

/// Write side of the published frame. Held by the assembler.
#[derive(Debug)]
pub struct FramePublisher {
    tx: watch::Sender<Arc<FrameBuffer>>,
}

impl FramePublisher {
    /// Atomically replace the published frame.
    pub fn publish(&self, frame: FrameBuffer) {
        self.tx.send_replace(Arc::new(frame));
    }

    /// The currently published frame.
    pub fn current(&self) -> Arc<FrameBuffer> {
        self.tx.borrow().clone()
    }

    /// Create another reader of the published frame.
    pub fn subscribe(&self) -> FrameWatch {
        FrameWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the published frame. Cheap to clone; one per renderer.
#[derive(Debug, Clone)]
pub struct FrameWatch {
    rx: watch::Receiver<Arc<FrameBuffer>>,
}

impl FrameWatch {
    /// The latest published frame.
    pub fn current(&self) -> Arc<FrameBuffer> {
        self.rx.borrow().clone()
    }

    /// Wait until a new frame is published and return it.
    ///
    /// Fails with `ConnectionClosed` once the publisher is gone.
    pub async fn changed(&mut self) -> Result<Arc<FrameBuffer>> {
        self.rx
            .changed()
            .await
            .map_err(|_| CamviewError::ConnectionClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}
