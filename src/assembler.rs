//! Image assembly: one pass fetches a whole frame line by line.
//!
//! A pass:
//! 1. sends `getimage` so the board captures a fresh frame (reply unchecked)
//! 2. requests lines 0..120 in order, repeating each request until the reply
//!    is exactly 320 bytes
//! 3. publishes the finished frame in one swap
//!
//! A line that never arrives is retried forever; the pass does not give up on
//! short reads. Only link-level errors end a pass early, and an aborted pass
//! never publishes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::correlator::Correlator;
use crate::error::{CamviewError, Result};
use crate::frame::{frame_channel, FrameBuffer, FrameLine, FramePublisher, FrameWatch, LINE_BYTES, LINE_COUNT};
use crate::protocol::Command;

/// Builds frames from line requests and publishes them.
#[derive(Debug)]
pub struct ImageAssembler {
    correlator: Arc<Correlator>,
    publisher: FramePublisher,
    timeout: Duration,
    in_flight: AtomicBool,
    passes: AtomicU64,
}

impl ImageAssembler {
    /// Create an assembler and a watch on the frames it publishes.
    pub fn new(correlator: Arc<Correlator>, timeout: Duration) -> (Self, FrameWatch) {
        let (publisher, watch) = frame_channel();
        let assembler = Self {
            correlator,
            publisher,
            timeout,
            in_flight: AtomicBool::new(false),
            passes: AtomicU64::new(0),
        };
        (assembler, watch)
    }

    /// Fetch one full frame and publish it.
    ///
    /// # Errors
    ///
    /// - `PassInProgress` if another pass on this assembler is running
    /// - `ConversationInProgress` if something else holds the link
    /// - `ConnectionClosed` if the link goes away
    pub async fn run_pass(&self) -> Result<()> {
        let _pass = self.begin_pass()?;

        // The getimage reply is not inspected
        self.correlator.request(Command::GetImage).await?;

        let mut working = FrameBuffer::clone(&self.publisher.current());
        for index in 0..LINE_COUNT {
            let line = self.fetch_line(index).await?;
            working.set_line(index, line)?;
        }

        self.publisher.publish(working);
        let passes = self.passes.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!("Published frame {}", passes);
        Ok(())
    }

    /// Request one line until a full-length reply arrives.
    async fn fetch_line(&self, index: usize) -> Result<FrameLine> {
        let command = Command::get_line(index)?;
        loop {
            let reply = self
                .correlator
                .converse(command.encode(), command.expected_size(), self.timeout)
                .await?;

            match FrameLine::from_reply(&reply) {
                Some(line) => return Ok(line),
                None => tracing::debug!(
                    "Short reply for line {}: {} of {} bytes, retrying",
                    index,
                    reply.len(),
                    LINE_BYTES
                ),
            }
        }
    }

    fn begin_pass(&self) -> Result<PassGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CamviewError::PassInProgress)?;
        Ok(PassGuard {
            in_flight: &self.in_flight,
        })
    }

    /// Replace the published frame with the all-zero frame.
    pub fn reset(&self) {
        self.publisher.publish(FrameBuffer::zeroed());
        tracing::info!("Frame buffer reset");
    }

    /// Check if a pass is running.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of frames published so far.
    pub fn passes_completed(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    /// The currently published frame.
    pub fn current(&self) -> Arc<FrameBuffer> {
        self.publisher.current()
    }

    /// Another watch on published frames.
    pub fn subscribe(&self) -> FrameWatch {
        self.publisher.subscribe()
    }
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct PassGuard<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}
