//! Poll driver: triggers assembly passes on a fixed period.
//!
//! The trigger period is usually far shorter than a pass takes, so ticks that
//! land while a pass is in flight are skipped rather than queued. Each pass
//! runs in its own task so the driver keeps answering control commands
//! while a line is being retried.
//!
//! # Example
//!
//! ```ignore
//! let (poll, driver) = spawn_poll_driver(assembler.clone(), Duration::from_millis(1));
//!
//! poll.pause().await?;
//! poll.reset().await?;   // zero the frame and refetch now, even while paused
//! poll.resume().await?;
//! poll.shutdown().await?;
//! driver.await??;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

use crate::assembler::ImageAssembler;
use crate::error::{CamviewError, Result};

/// Capacity of the driver's control queue.
const COMMAND_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollCommand {
    Pause,
    Resume,
    Reset,
    Shutdown,
}

/// Control handle for a running poll driver.
#[derive(Debug, Clone)]
pub struct PollHandle {
    tx: mpsc::Sender<PollCommand>,
}

impl PollHandle {
    /// Stop starting new passes. A pass already running finishes.
    pub async fn pause(&self) -> Result<()> {
        self.send(PollCommand::Pause).await
    }

    /// Start triggering passes again.
    pub async fn resume(&self) -> Result<()> {
        self.send(PollCommand::Resume).await
    }

    /// Zero the published frame and start a pass right away.
    ///
    /// If a pass is already running, it stands in for the new one.
    pub async fn reset(&self) -> Result<()> {
        self.send(PollCommand::Reset).await
    }

    /// Abort any running pass and stop the driver.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(PollCommand::Shutdown).await
    }

    async fn send(&self, command: PollCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| CamviewError::ConnectionClosed)
    }
}

/// Spawn the poll driver.
///
/// The driver ends on `shutdown`, when every [`PollHandle`] is dropped, or with
/// `ConnectionClosed` once a pass reports the link gone.
pub fn spawn_poll_driver(
    assembler: Arc<ImageAssembler>,
    interval: Duration,
) -> (PollHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let task = tokio::spawn(poll_loop(assembler, interval, rx));
    (PollHandle { tx }, task)
}

async fn poll_loop(
    assembler: Arc<ImageAssembler>,
    interval: Duration,
    mut rx: mpsc::Receiver<PollCommand>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut paused = false;
    let mut pass: Option<JoinHandle<Result<()>>> = None;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(PollCommand::Pause) => {
                    paused = true;
                    tracing::info!("Polling paused");
                }
                Some(PollCommand::Resume) => {
                    paused = false;
                    ticker.reset();
                    tracing::info!("Polling resumed");
                }
                Some(PollCommand::Reset) => {
                    assembler.reset();
                    if pass.is_none() {
                        pass = Some(spawn_pass(&assembler));
                    } else {
                        tracing::debug!("Reset joined the pass already in flight");
                    }
                }
                Some(PollCommand::Shutdown) | None => {
                    if let Some(running) = pass.take() {
                        running.abort();
                    }
                    tracing::info!("Poll driver stopped");
                    return Ok(());
                }
            },

            _ = ticker.tick(), if !paused => {
                if pass.is_none() {
                    pass = Some(spawn_pass(&assembler));
                } else {
                    tracing::debug!("Poll tick skipped: pass still in flight");
                }
            }

            joined = join_pass(&mut pass), if pass.is_some() => {
                pass = None;
                handle_pass_result(joined)?;
            }
        }
    }
}

fn spawn_pass(assembler: &Arc<ImageAssembler>) -> JoinHandle<Result<()>> {
    let assembler = assembler.clone();
    tokio::spawn(async move { assembler.run_pass().await })
}

async fn join_pass(
    pass: &mut Option<JoinHandle<Result<()>>>,
) -> std::result::Result<Result<()>, JoinError> {
    match pass {
        Some(running) => running.await,
        None => std::future::pending().await,
    }
}

/// Log a finished pass. Only a closed link stops the driver.
fn handle_pass_result(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(CamviewError::ConnectionClosed)) => {
            tracing::error!("Link closed, stopping poll driver");
            Err(CamviewError::ConnectionClosed)
        }
        Ok(Err(CamviewError::PassInProgress)) => {
            tracing::debug!("Pass skipped: another pass is running");
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!("Assembly pass failed: {}", e);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Assembly pass task failed: {}", e);
            Ok(())
        }
    }
}
