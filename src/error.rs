//! Error types for camview-client.

use thiserror::Error;

/// Main error type for all camview operations.
#[derive(Debug, Error)]
pub enum CamviewError {
    /// I/O error on the serial transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A request is already outstanding on the link.
    ///
    /// Only one conversation may be in flight at a time. Hitting this means two
    /// callers raced for the link, usually overlapping assembly passes.
    #[error("Conversation already in progress")]
    ConversationInProgress,

    /// An assembly pass is already running.
    #[error("Assembly pass already in progress")]
    PassInProgress,

    /// Protocol error (bad register reply, invalid line index, bad config).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The transport reached EOF or the writer task is gone.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using CamviewError.
pub type Result<T> = std::result::Result<T, CamviewError>;
