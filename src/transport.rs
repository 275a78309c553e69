//! # Serial Transport Layer
//!
//! This module provides the serial transport for the RTU stack: an
//! async-trait seam ([`SerialLink`]) and its hardware implementation
//! ([`RtuLink`]) on top of `tokio-serial`.
//!
//! ## Behavior
//!
//! - Bounded-timeout polling reads so a dispatcher loop stays responsive
//!   to shutdown signals
//! - Frame-gap paced response reads (3.5 character times at the configured
//!   baud rate) for the master's bounded response window
//! - Input buffer clearing so a transaction never observes stale bytes
//! - Per-link transfer statistics and optional raw packet logging
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rtu_stack::transport::{RtuLink, SerialLink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut link = RtuLink::new("/dev/ttyUSB0", 9600);
//!     link.connect()?;
//!
//!     link.write_frame(&[0x01, 0x05, 0x00, 0x00, 0xFF, 0x00, 0x8C, 0x3A]).await?;
//!     let response = link.read_frame(std::time::Duration::from_secs(1)).await?;
//!     println!("response: {:02X?}", response);
//!
//!     link.close().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::SerialPort;

use crate::error::{RtuError, RtuResult};
use crate::MAX_RTU_FRAME_SIZE;

/// Format raw bytes as hex string for packet logging
fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log packet with direction
fn log_packet(direction: &str, data: &[u8]) {
    info!("[RTU] {} {}", direction, format_hex_packet(data));
}

/// Serial link configuration
///
/// Carries the parameters the stack treats as fixed at construction.
/// Defaults match the wire contract: 9600 baud, 8 data bits, no parity,
/// one stop bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial device path (e.g. `/dev/ttyUSB0`, `COM2`)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Bounded poll read timeout in milliseconds
    pub poll_timeout_ms: u64,
    /// Enable raw packet logging
    pub packet_logging: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: crate::DEFAULT_BAUD_RATE,
            poll_timeout_ms: crate::DEFAULT_POLL_TIMEOUT_MS,
            packet_logging: false,
        }
    }
}

/// Serial link abstraction
///
/// The seam between the protocol engines and the physical serial device.
/// The master engine and the slave dispatcher are written against this
/// trait so tests can substitute an in-memory link.
#[async_trait]
pub trait SerialLink: Send {
    /// Write one complete frame and flush it onto the wire
    async fn write_frame(&mut self, frame: &[u8]) -> RtuResult<()>;

    /// Read whatever bytes are currently available
    ///
    /// Waits at most the link's poll timeout for data; returns `Ok(0)`
    /// when the window elapses with nothing received. This keeps caller
    /// loops responsive to shutdown signals.
    async fn read_available(&mut self, buf: &mut [u8]) -> RtuResult<usize>;

    /// Read one response frame
    ///
    /// Waits up to `first_byte_timeout` for the first byte, then collects
    /// bytes until a frame gap (3.5 character times) passes with no data.
    async fn read_frame(&mut self, first_byte_timeout: Duration) -> RtuResult<Vec<u8>>;

    /// Discard any bytes pending in the input buffer
    async fn clear_input(&mut self) -> RtuResult<()>;

    /// Check if the link is open
    fn is_connected(&self) -> bool;

    /// Close the link
    async fn close(&mut self) -> RtuResult<()>;

    /// Get transfer statistics
    fn get_stats(&self) -> LinkStats;
}

/// Serial link statistics
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// RTU serial link over a hardware port
pub struct RtuLink {
    /// Serial port connection
    port: Option<tokio_serial::SerialStream>,
    /// Port name/path
    port_name: String,
    /// Baud rate
    baud_rate: u32,
    /// Data bits
    data_bits: tokio_serial::DataBits,
    /// Stop bits
    stop_bits: tokio_serial::StopBits,
    /// Parity
    parity: tokio_serial::Parity,
    /// Bounded poll read timeout
    poll_timeout: Duration,
    /// Minimum idle time marking the end of a frame
    frame_gap: Duration,
    /// Link statistics
    stats: LinkStats,
    /// Enable packet logging for debugging
    packet_logging: bool,
}

impl RtuLink {
    /// Create a new RTU link with default 8N1 framing
    ///
    /// The port is not opened yet; call [`RtuLink::connect`].
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self::new_with_config(
            port,
            baud_rate,
            tokio_serial::DataBits::Eight,
            tokio_serial::StopBits::One,
            tokio_serial::Parity::None,
            Duration::from_millis(crate::DEFAULT_POLL_TIMEOUT_MS),
        )
    }

    /// Create a new RTU link from a [`LinkConfig`]
    pub fn from_config(config: &LinkConfig) -> Self {
        let mut link = Self::new_with_config(
            &config.port,
            config.baud_rate,
            tokio_serial::DataBits::Eight,
            tokio_serial::StopBits::One,
            tokio_serial::Parity::None,
            Duration::from_millis(config.poll_timeout_ms),
        );
        link.packet_logging = config.packet_logging;
        link
    }

    /// Create a new RTU link with full serial configuration
    pub fn new_with_config(
        port: &str,
        baud_rate: u32,
        data_bits: tokio_serial::DataBits,
        stop_bits: tokio_serial::StopBits,
        parity: tokio_serial::Parity,
        poll_timeout: Duration,
    ) -> Self {
        // Frame gap is 3.5 character times; one character is 11 bits
        let char_time_us = (11_000_000 / baud_rate) as u64;
        let frame_gap = Duration::from_micros(char_time_us * 35 / 10);

        Self {
            port: None,
            port_name: port.to_string(),
            baud_rate,
            data_bits,
            stop_bits,
            parity,
            poll_timeout,
            frame_gap,
            stats: LinkStats::default(),
            packet_logging: false,
        }
    }

    /// Enable or disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// Open the serial port
    pub fn connect(&mut self) -> RtuResult<()> {
        let builder = tokio_serial::new(&self.port_name, self.baud_rate)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(self.parity)
            .timeout(self.poll_timeout);

        let port = tokio_serial::SerialStream::open(&builder).map_err(|e| {
            RtuError::connection(format!(
                "Failed to open serial port {}: {}",
                self.port_name, e
            ))
        })?;

        debug!("Opened serial port {} at {} baud", self.port_name, self.baud_rate);
        self.port = Some(port);

        Ok(())
    }

    /// Minimum idle time marking the end of a frame at this baud rate
    pub fn frame_gap(&self) -> Duration {
        self.frame_gap
    }
}

#[async_trait]
impl SerialLink for RtuLink {
    async fn write_frame(&mut self, frame: &[u8]) -> RtuResult<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| RtuError::connection("Serial port not connected"))?;

        if let Err(e) = port.write_all(frame).await {
            self.stats.errors += 1;
            return Err(RtuError::io(format!("Failed to send RTU frame: {}", e)));
        }
        if let Err(e) = port.flush().await {
            self.stats.errors += 1;
            return Err(RtuError::io(format!("Failed to flush RTU frame: {}", e)));
        }

        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        if self.packet_logging {
            log_packet("send", frame);
        }

        Ok(())
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> RtuResult<usize> {
        let poll_timeout = self.poll_timeout;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| RtuError::connection("Serial port not connected"))?;

        match timeout(poll_timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                self.stats.bytes_received += n as u64;
                Ok(n)
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                Err(RtuError::io(format!("Serial read error: {}", e)))
            }
            Err(_) => Ok(0),
        }
    }

    async fn read_frame(&mut self, first_byte_timeout: Duration) -> RtuResult<Vec<u8>> {
        let frame_gap = self.frame_gap;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| RtuError::connection("Serial port not connected"))?;

        let mut frame = Vec::new();
        let mut buffer = [0u8; 1];

        // First byte is bounded by the caller's timeout
        match timeout(first_byte_timeout, port.read_exact(&mut buffer)).await {
            Ok(Ok(_)) => frame.push(buffer[0]),
            Ok(Err(e)) => {
                self.stats.errors += 1;
                return Err(RtuError::io(format!("Serial read error: {}", e)));
            }
            Err(_) => {
                self.stats.timeouts += 1;
                return Err(RtuError::timeout(
                    "read response",
                    first_byte_timeout.as_millis() as u64,
                ));
            }
        }

        // Remaining bytes end at the first frame gap
        loop {
            match timeout(frame_gap, port.read_exact(&mut buffer)).await {
                Ok(Ok(_)) => {
                    frame.push(buffer[0]);
                    if frame.len() > MAX_RTU_FRAME_SIZE {
                        self.stats.errors += 1;
                        return Err(RtuError::frame("RTU frame too large"));
                    }
                }
                Ok(Err(e)) => {
                    self.stats.errors += 1;
                    return Err(RtuError::io(format!("Serial read error: {}", e)));
                }
                Err(_) => break,
            }
        }

        self.stats.frames_received += 1;
        self.stats.bytes_received += frame.len() as u64;

        if self.packet_logging {
            log_packet("receive", &frame);
        }

        Ok(frame)
    }

    async fn clear_input(&mut self) -> RtuResult<()> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| RtuError::connection("Serial port not connected"))?;

        port.clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| RtuError::io(format!("Failed to clear input buffer: {}", e)))
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn close(&mut self) -> RtuResult<()> {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }

    fn get_stats(&self) -> LinkStats {
        self.stats.clone()
    }
}
