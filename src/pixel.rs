//! RGB565 decoding and the 2x upscale used for display.
//!
//! Each pixel is two bytes, high byte first. Channels are widened by plain
//! multiplication, so full-scale values are 248/252/248 rather than 255.

use crate::frame::{FrameBuffer, BYTES_PER_PIXEL, FRAME_WIDTH, LINE_COUNT};

/// Width of the display surface.
pub const SURFACE_WIDTH: usize = FRAME_WIDTH * 2;

/// Height of the display surface.
pub const SURFACE_HEIGHT: usize = LINE_COUNT * 2;

/// An 8-bit-per-channel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Decode one RGB565 pixel from its high and low bytes.
///
/// # Example
///
/// ```
/// use camview_client::pixel::{decode_rgb565, Rgb};
///
/// assert_eq!(decode_rgb565(0xFF, 0xFF), Rgb { r: 248, g: 252, b: 248 });
/// assert_eq!(decode_rgb565(0x00, 0x00), Rgb { r: 0, g: 0, b: 0 });
/// ```
#[inline]
pub fn decode_rgb565(byte1: u8, byte2: u8) -> Rgb {
    let value = (byte1 as u16) << 8 | byte2 as u16;

    let red = (value >> 8 + 3) & 0x1f;
    let green = (value >> 5) & 0x3f;
    let blue = value & 0x1f;

    Rgb {
        r: (red * 8) as u8,
        g: (green * 4) as u8,
        b: (blue * 8) as u8,
    }
}

impl FrameBuffer {
    /// Decode the pixel at logical position `(x, y)`.
    ///
    /// Returns `None` outside the 160x120 grid.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= FRAME_WIDTH {
            return None;
        }
        let line = self.line(y)?.as_bytes();
        let i = x * BYTES_PER_PIXEL;
        Some(decode_rgb565(line[i], line[i + 1]))
    }
}

/// Render a frame onto a 320x240 row-major surface, each pixel replicated 2x2.
pub fn render_scaled(frame: &FrameBuffer) -> Vec<Rgb> {
    let mut surface = vec![Rgb::default(); SURFACE_WIDTH * SURFACE_HEIGHT];

    for (y, line) in frame.lines().enumerate() {
        for (x, pair) in line.as_bytes().chunks_exact(BYTES_PER_PIXEL).enumerate() {
            let color = decode_rgb565(pair[0], pair[1]);
            let top = (2 * y) * SURFACE_WIDTH + 2 * x;
            let bottom = top + SURFACE_WIDTH;
            surface[top] = color;
            surface[top + 1] = color;
            surface[bottom] = color;
            surface[bottom + 1] = color;
        }
    }

    surface
}
