//! # camview-client
//!
//! Host-side client for pulling still frames off a serial-attached OV7670
//! camera board and assembling them for display.
//!
//! ## Architecture
//!
//! - **Protocol**: CR-terminated ASCII commands; replies are either a fixed
//!   number of raw bytes or a `\n`-terminated line
//! - **Correlator**: one request in flight at a time, with a timeout that
//!   completes the request with whatever has arrived
//! - **Assembler**: `getimage`, then `getline 0..119`, retrying short lines,
//!   then one atomic frame swap
//! - **Poll driver**: periodic passes with pause/resume/reset, never overlapping
//!
//! ## Example
//!
//! ```ignore
//! use camview_client::{spawn_poll_driver, Camera};
//!
//! #[tokio::main]
//! async fn main() -> camview_client::Result<()> {
//!     let camera = Camera::builder().connect(serial_port)?;
//!     let (assembler, mut frames) = camera.image_assembler();
//!     let (_poll, _driver) = spawn_poll_driver(assembler, camera.config().poll_interval());
//!
//!     let frame = frames.changed().await?;
//!     let surface = camview_client::pixel::render_scaled(&frame);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod pixel;
pub mod protocol;

mod assembler;
mod client;
mod correlator;
mod poll;
mod writer;

pub use assembler::ImageAssembler;
pub use client::{Camera, CameraBuilder};
pub use config::CameraConfig;
pub use correlator::{Correlator, DEFAULT_CONVERSE_TIMEOUT};
pub use error::{CamviewError, Result};
pub use frame::{FrameBuffer, FrameLine, FrameWatch};
pub use poll::{spawn_poll_driver, PollHandle};
pub use writer::WriterHandle;
