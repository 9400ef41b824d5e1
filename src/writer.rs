//! Dedicated writer task for the serial link.
//!
//! Commands are handed to a task that owns the write half of the transport,
//! through an mpsc channel. Callers never hold a lock on the transport.
//!
//! ```text
//! Correlator ─► mpsc::Sender<Bytes> ─► Writer Task ─► serial TX
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{CamviewError, Result};

/// Handle for sending commands to the writer task.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    pub(crate) fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Queue bytes for writing.
    ///
    /// Fails with `ConnectionClosed` if the writer task has stopped.
    pub async fn send(&self, data: Bytes) -> Result<()> {
        self.tx
            .send(data)
            .await
            .map_err(|_| CamviewError::ConnectionClosed)
    }

    /// Check if the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending commands.
///
/// The task ends cleanly when every handle is dropped, or with an error when
/// the transport write fails.
pub fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer).await;
        if let Err(e) = &result {
            tracing::error!("Writer loop error: {}", e);
        }
        result
    });
    (WriterHandle::new(tx), task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(data) = rx.recv().await {
        writer.write_all(&data).await?;
        writer.flush().await?;
    }
    // Channel closed, clean shutdown
    Ok(())
}
