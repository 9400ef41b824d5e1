//! Request/response correlation over the serial link.
//!
//! The camera has no request IDs, so replies are matched to requests purely by
//! order: exactly one request may be outstanding. The [`Correlator`] owns that
//! single pending slot:
//!
//! 1. `converse` claims the slot (or fails with `ConversationInProgress`)
//! 2. the command is queued on the writer task
//! 3. the reader loop feeds incoming bytes into the slot's [`ReplyParser`]
//! 4. the caller resumes when the parser completes the reply, or when the
//!    timeout forces completion with whatever has arrived so far
//!
//! A timeout is not an error. A short or empty reply is returned as-is and
//! the caller decides whether it is usable.
//!
//! # Example
//!
//! ```ignore
//! use camview_client::protocol::Command;
//!
//! let reply = correlator.request(Command::GetLine(0)).await?;
//! if reply.len() != 320 {
//!     // short read, ask again
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{CamviewError, Result};
use crate::protocol::{Command, Framing, ReplyParser};
use crate::writer::WriterHandle;

/// Default time to wait for a reply before forcing completion.
pub const DEFAULT_CONVERSE_TIMEOUT: Duration = Duration::from_secs(1);

/// The single pending-request slot.
#[derive(Debug)]
struct Slot {
    /// Parser state; non-idle exactly while a request is pending.
    parser: ReplyParser,
    /// Completion handle of the pending request.
    waiter: Option<oneshot::Sender<Bytes>>,
    /// Bumped for every claimed slot, so stale guards leave newer requests alone.
    generation: u64,
    /// Set once the reader has hit EOF.
    closed: bool,
}

impl Slot {
    fn new() -> Self {
        Self {
            parser: ReplyParser::new(),
            waiter: None,
            generation: 0,
            closed: false,
        }
    }
}

/// Serializes requests over the link and resolves each with its reply.
#[derive(Debug)]
pub struct Correlator {
    slot: Arc<Mutex<Slot>>,
    writer: WriterHandle,
    default_timeout: Duration,
}

impl Correlator {
    /// Create a correlator writing through the given writer handle.
    pub fn new(writer: WriterHandle, default_timeout: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::new())),
            writer,
            default_timeout,
        }
    }

    /// Send `message` and wait for its reply.
    ///
    /// With `expected_size` the reply is exactly that many bytes; without it
    /// the reply runs to the next `\n`. If `timeout` passes first, the reply
    /// is whatever has accumulated, possibly empty.
    ///
    /// # Errors
    ///
    /// - `ConversationInProgress` if a request is already pending. Nothing is
    ///   written and the pending request is untouched.
    /// - `ConnectionClosed` if the link is closed.
    pub async fn converse(
        &self,
        message: Bytes,
        expected_size: Option<usize>,
        timeout: Duration,
    ) -> Result<Bytes> {
        let (tx, mut rx) = oneshot::channel();

        let generation = {
            let mut slot = self.lock();
            if slot.closed {
                return Err(CamviewError::ConnectionClosed);
            }
            slot.parser.begin(Framing::from_expected(expected_size))?;
            slot.waiter = Some(tx);
            slot.generation += 1;
            slot.generation
        };

        // Frees the slot if this future is dropped or bails out early
        let _guard = PendingGuard {
            slot: &self.slot,
            generation,
        };

        self.writer.send(message).await?;

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(CamviewError::ConnectionClosed),
            Err(_) => {
                let mut slot = self.lock();
                // The reader may have finished the reply just before we got the lock
                if let Ok(reply) = rx.try_recv() {
                    return Ok(reply);
                }
                let partial = slot.parser.force_complete().unwrap_or_default();
                slot.waiter = None;
                tracing::debug!(
                    "Reply timed out after {:?} with {} bytes",
                    timeout,
                    partial.len()
                );
                Ok(partial)
            }
        }
    }

    /// Send a command using its own framing and the default timeout.
    pub async fn request(&self, command: Command) -> Result<Bytes> {
        self.converse(command.encode(), command.expected_size(), self.default_timeout)
            .await
    }

    /// Feed bytes received from the transport.
    ///
    /// Completes the pending request when its reply is finished. Bytes with
    /// no request pending are logged and dropped.
    pub fn feed(&self, data: &[u8]) {
        let mut slot = self.lock();
        for &byte in data {
            if let Some(reply) = slot.parser.feed(byte) {
                if let Some(waiter) = slot.waiter.take() {
                    // Receiver gone means the caller was cancelled
                    let _ = waiter.send(reply);
                }
            }
        }
    }

    /// Mark the link closed; later `converse` calls fail immediately.
    ///
    /// A request already pending still resolves through its timeout.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Check if the link has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Check if a request is pending.
    pub fn is_busy(&self) -> bool {
        !self.lock().parser.is_idle()
    }

    /// Number of stray bytes received while no request was pending.
    pub fn unhandled_bytes(&self) -> u64 {
        self.lock().parser.unhandled_count()
    }

    /// Timeout used by [`Correlator::request`].
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        lock_slot(&self.slot)
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the pending slot on drop, if it still belongs to this request.
struct PendingGuard<'a> {
    slot: &'a Mutex<Slot>,
    generation: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock_slot(self.slot);
        if slot.generation == self.generation {
            slot.parser.reset();
            slot.waiter = None;
        }
    }
}
