//! Client configuration.
//!
//! All fields have defaults matching the camera firmware's expectations, so an
//! empty JSON object is a valid configuration:
//!
//! ```
//! use camview_client::config::CameraConfig;
//!
//! let config = CameraConfig::from_json_str(r#"{ "poll_interval_ms": 5 }"#).unwrap();
//! assert_eq!(config.poll_interval_ms, 5);
//! assert_eq!(config.converse_timeout_ms, 1000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CamviewError, Result};

/// Default reply timeout in milliseconds.
pub const DEFAULT_CONVERSE_TIMEOUT_MS: u64 = 1000;

/// Default poll trigger period in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Default writer channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default reader chunk size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Tunables for a camera connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// How long to wait for a reply before taking what has arrived.
    pub converse_timeout_ms: u64,
    /// Period of the poll driver's pass trigger.
    pub poll_interval_ms: u64,
    /// Capacity of the writer task's command queue.
    pub channel_capacity: usize,
    /// Size of each transport read.
    pub read_buffer_size: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            converse_timeout_ms: DEFAULT_CONVERSE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl CameraConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        let zero_field = if self.converse_timeout_ms == 0 {
            Some("converse_timeout_ms")
        } else if self.poll_interval_ms == 0 {
            Some("poll_interval_ms")
        } else if self.channel_capacity == 0 {
            Some("channel_capacity")
        } else if self.read_buffer_size == 0 {
            Some("read_buffer_size")
        } else {
            None
        };

        match zero_field {
            Some(field) => Err(CamviewError::Protocol(format!("{} must be non-zero", field))),
            None => Ok(()),
        }
    }

    /// Reply timeout as a `Duration`.
    #[inline]
    pub fn converse_timeout(&self) -> Duration {
        Duration::from_millis(self.converse_timeout_ms)
    }

    /// Poll period as a `Duration`.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
