//! Camera connection builder and runtime loop.
//!
//! The [`CameraBuilder`] takes configuration and an already-open transport.
//! [`Camera`] then runs:
//! 1. a writer task that owns the transport's write half
//! 2. a reader loop that feeds received bytes to the [`Correlator`]
//!
//! Opening the serial device and setting the baud rate (921600 on the
//! reference board) is left to the caller; any `AsyncRead + AsyncWrite`
//! works.
//!
//! # Example
//!
//! ```ignore
//! use camview_client::{spawn_poll_driver, Camera};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = open_serial_port("/dev/ttyUSB0", 921_600)?;
//!     let camera = Camera::builder().connect(port)?;
//!
//!     println!("COM7 = {:#04x}", camera.read_register(0x12).await?);
//!
//!     let (assembler, mut frames) = camera.image_assembler();
//!     let (poll, _driver) = spawn_poll_driver(assembler, camera.config().poll_interval());
//!
//!     loop {
//!         let frame = frames.changed().await?;
//!         draw(&frame);
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;

use crate::assembler::ImageAssembler;
use crate::config::CameraConfig;
use crate::correlator::Correlator;
use crate::error::{CamviewError, Result};
use crate::frame::FrameWatch;
use crate::protocol::{parse_register_reply, Command};
use crate::writer::spawn_writer_task;

/// Builder for configuring and connecting a camera.
#[derive(Debug, Clone, Default)]
pub struct CameraBuilder {
    config: CameraConfig,
}

impl CameraBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the reply timeout.
    ///
    /// Default: 1 second
    pub fn converse_timeout(mut self, timeout: Duration) -> Self {
        self.config.converse_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the poll driver period.
    ///
    /// Default: 1 millisecond
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 16
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the transport read size.
    ///
    /// Default: 4096
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Connect over a bidirectional transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<T>(self, transport: T) -> Result<Camera>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(transport);
        self.connect_split(reader, writer)
    }

    /// Connect over separate read and write halves.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect_split<R, W>(self, reader: R, writer: W) -> Result<Camera>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Camera::start(self.config, reader, writer)
    }
}

/// A connected camera.
pub struct Camera {
    correlator: Arc<Correlator>,
    config: CameraConfig,
    reader_task: JoinHandle<Result<()>>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Camera {
    /// Create a new camera builder.
    pub fn builder() -> CameraBuilder {
        CameraBuilder::new()
    }

    fn start<R, W>(config: CameraConfig, reader: R, writer: W) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        config.validate()?;

        let (writer, writer_task) = spawn_writer_task(writer, config.channel_capacity);
        let correlator = Arc::new(Correlator::new(writer, config.converse_timeout()));

        let reader_correlator = correlator.clone();
        let buffer_size = config.read_buffer_size;
        let reader_task = tokio::spawn(async move {
            let result = read_loop(reader, &reader_correlator, buffer_size).await;
            reader_correlator.close();
            if let Err(e) = &result {
                tracing::error!("Read loop error: {}", e);
            }
            result
        });

        Ok(Camera {
            correlator,
            config,
            reader_task,
            _writer_task: writer_task,
        })
    }

    /// The correlator shared by everything talking to this camera.
    pub fn correlator(&self) -> Arc<Correlator> {
        self.correlator.clone()
    }

    /// The active configuration.
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Send raw bytes and wait for the reply. See [`Correlator::converse`].
    pub async fn converse(
        &self,
        message: Bytes,
        expected_size: Option<usize>,
        timeout: Duration,
    ) -> Result<Bytes> {
        self.correlator.converse(message, expected_size, timeout).await
    }

    /// Read a sensor register.
    pub async fn read_register(&self, addr: u8) -> Result<u8> {
        let reply = self.correlator.request(Command::ReadRegister(addr)).await?;
        let register = parse_register_reply(&reply)?;
        if register.addr != addr {
            return Err(CamviewError::Protocol(format!(
                "Register reply for {:#04x}, expected {:#04x}",
                register.addr, addr
            )));
        }
        Ok(register.value)
    }

    /// Write a sensor register; the board echoes what it wrote.
    pub async fn write_register(&self, addr: u8, value: u8) -> Result<()> {
        let reply = self
            .correlator
            .request(Command::WriteRegister(addr, value))
            .await?;
        let register = parse_register_reply(&reply)?;
        if register.addr != addr || register.value != value {
            return Err(CamviewError::Protocol(format!(
                "Register write echoed {:#04x}={:#04x}, expected {:#04x}={:#04x}",
                register.addr, register.value, addr, value
            )));
        }
        Ok(())
    }

    /// Create an image assembler on this link and a watch on its frames.
    pub fn image_assembler(&self) -> (Arc<ImageAssembler>, FrameWatch) {
        let (assembler, watch) =
            ImageAssembler::new(self.correlator.clone(), self.config.converse_timeout());
        (Arc::new(assembler), watch)
    }

    /// Stop reading from the transport.
    pub fn shutdown(&self) {
        self.reader_task.abort();
        self.correlator.close();
    }

    /// Wait until the transport closes.
    ///
    /// Returns the reader's error if the link failed rather than reaching EOF.
    pub async fn wait_for_close(self) -> Result<()> {
        match self.reader_task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(_) => Err(CamviewError::ConnectionClosed),
        }
    }
}

/// Read from the transport and feed the correlator until EOF.
async fn read_loop<R>(mut reader: R, correlator: &Correlator, buffer_size: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("Serial link closed");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) => return Err(CamviewError::Io(e)),
        };

        correlator.feed(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};

    #[test]
    fn test_builder_configuration() {
        let builder = Camera::builder()
            .converse_timeout(Duration::from_millis(250))
            .poll_interval(Duration::from_millis(10))
            .channel_capacity(4)
            .read_buffer_size(64);

        assert_eq!(builder.config.converse_timeout_ms, 250);
        assert_eq!(builder.config.poll_interval_ms, 10);
        assert_eq!(builder.config.channel_capacity, 4);
        assert_eq!(builder.config.read_buffer_size, 64);
    }

    #[test]
    fn test_builder_default() {
        let builder = CameraBuilder::default();
        assert_eq!(builder.config, CameraConfig::default());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let (client, _device) = duplex(64);
        let result = Camera::builder().read_buffer_size(0).connect(client);
        assert!(matches!(result, Err(CamviewError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_read_register() {
        let (client, mut device) = duplex(256);
        let camera = Camera::builder().connect(client).unwrap();

        let device_task = tokio::spawn(async move {
            let mut buf = [0u8; 10];
            device.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"regr 0x12\r");
            device.write_all(b"0x12 0x80\r\n").await.unwrap();
            device
        });

        assert_eq!(camera.read_register(0x12).await.unwrap(), 0x80);
        let _device = device_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_register_address_mismatch() {
        let (client, mut device) = duplex(256);
        let camera = Camera::builder().connect(client).unwrap();

        let device_task = tokio::spawn(async move {
            let mut buf = [0u8; 10];
            device.read_exact(&mut buf).await.unwrap();
            device.write_all(b"0x13 0x80\r\n").await.unwrap();
            device
        });

        let result = camera.read_register(0x12).await;
        assert!(matches!(result, Err(CamviewError::Protocol(_))));
        let _device = device_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_register_error_reply() {
        let (client, mut device) = duplex(256);
        let camera = Camera::builder().connect(client).unwrap();

        let device_task = tokio::spawn(async move {
            let mut buf = [0u8; 15];
            device.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"regw 0x12 0x80\r");
            device.write_all(b"ERR\r\n").await.unwrap();
            device
        });

        let result = camera.write_register(0x12, 0x80).await;
        assert!(result.unwrap_err().to_string().contains("rejected"));
        let _device = device_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_closes_link() {
        let (client, device) = duplex(64);
        let camera = Camera::builder().connect(client).unwrap();
        let correlator = camera.correlator();

        drop(device);
        camera.wait_for_close().await.unwrap();

        assert!(correlator.is_closed());
        let result = correlator.request(Command::GetImage).await;
        assert!(matches!(result, Err(CamviewError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_reader() {
        let (client, _device) = duplex(64);
        let camera = Camera::builder().connect(client).unwrap();
        let correlator = camera.correlator();

        camera.shutdown();
        camera.wait_for_close().await.unwrap();
        assert!(correlator.is_closed());
    }
}
