//! # RTU Stack Error Handling
//!
//! This module provides the error handling for the RTU stack, covering serial
//! transport failures, frame parsing and validation, and device exception
//! responses.
//!
//! ## Overview
//!
//! Every fallible operation in the crate returns [`RtuResult`]. Decode
//! failures on wire data are always representable values, never panics:
//! a short read, a bad checksum, or a frame addressed to another unit each
//! map to a dedicated variant so callers can distinguish "the device said
//! no" from "the line is broken".
//!
//! ## Error Categories
//!
//! ### Transport Errors
//! - **I/O Errors**: serial port read/write failures
//! - **Connection Errors**: device open and configuration problems
//! - **Timeout Errors**: no (or not enough) bytes within the read window
//!
//! ### Protocol Errors
//! - **CRC Errors**: checksum disagreement on a received frame
//! - **Frame Errors**: structurally invalid or incomplete frames
//! - **Unit Mismatch**: frame addressed to a different unit id
//! - **Exception Responses**: the slave signalled a Modbus exception
//!
//! ### Data Errors
//! - **Invalid Function**: function code outside the supported set
//! - **Invalid Address**: register or coil range outside the store
//! - **Invalid Data**: malformed payload values
//!
//! ## Usage
//!
//! ```rust
//! use rtu_stack::{RtuError, RtuResult};
//!
//! fn classify(result: RtuResult<Vec<u16>>) {
//!     match result {
//!         Ok(words) => println!("read {} registers", words.len()),
//!         Err(RtuError::Timeout { operation, timeout_ms }) => {
//!             println!("timeout during {} after {}ms", operation, timeout_ms);
//!         }
//!         Err(RtuError::Exception { function, code, message }) => {
//!             println!("device exception {:02X}/{:02X}: {}", function, code, message);
//!         }
//!         Err(error) => println!("other failure: {}", error),
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for RTU operations
///
/// Convenience alias using [`RtuError`] as the error type for all
/// operations in the crate.
pub type RtuResult<T> = Result<T, RtuError>;

/// Error types for the RTU stack
///
/// Covers every failure condition the master engine, slave dispatcher, and
/// codec can produce. Each variant carries the context needed to log the
/// failure meaningfully; none of them carries a panic path.
#[derive(Error, Debug, Clone)]
pub enum RtuError {
    /// I/O related errors on the serial device
    ///
    /// # Examples
    /// - Serial port access denied
    /// - Device unplugged mid-transaction
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Device open or connection maintenance failure
    ///
    /// Distinct from general I/O errors: the link never came up, or its
    /// configuration was rejected by the driver.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Operation exceeded its configured timeout
    ///
    /// Includes which operation timed out and the timeout duration.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Received frame is shorter than the minimum viable length
    ///
    /// A data response needs at least 5 bytes (unit, function, one payload
    /// byte, two CRC bytes); a request needs exactly 8.
    #[error("Incomplete frame: got {actual} bytes, need at least {minimum}")]
    IncompleteFrame { minimum: usize, actual: usize },

    /// CRC validation failure on a received frame
    ///
    /// Provides both expected and actual CRC values for debugging. A frame
    /// failing this check is treated as dropped, never corrected.
    #[error("CRC validation failed: expected={expected:04X}, actual={actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Frame addressed to a different unit id
    ///
    /// On a shared RTU bus every device sees all traffic; a slave drops
    /// such frames silently and a master treats them as a decode failure.
    #[error("Unit mismatch: expected={expected}, actual={actual}")]
    UnitMismatch { expected: u8, actual: u8 },

    /// Function code outside the supported set (0x01, 0x03, 0x05)
    #[error("Invalid function code: {code:#04X}")]
    InvalidFunction { code: u8 },

    /// Address range outside the register store
    ///
    /// Raised when `start + count` runs past the configured array size.
    /// Never allowed to become an out-of-bounds access.
    #[error("Invalid address: start={start}, count={count}, limit={limit}")]
    InvalidAddress { start: u16, count: u16, limit: u16 },

    /// Malformed payload values
    ///
    /// # Examples
    /// - Byte count that disagrees with the received payload
    /// - Odd payload length for 16-bit register data
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Modbus exception response from the slave
    ///
    /// The slave answered with `function | 0x80` and a one-byte exception
    /// code. The standard codes seen here are 0x01 (illegal function),
    /// 0x02 (illegal data address), and 0x03 (illegal data value).
    #[error("Modbus exception: function={function:02X}, code={code:02X} ({message})")]
    Exception { function: u8, code: u8, message: String },

    /// Structurally invalid frame
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Configuration errors
    ///
    /// # Examples
    /// - Zero-sized register store
    /// - Malformed configuration file
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal errors (should not occur in normal operation)
    ///
    /// # Examples
    /// - Poisoned register store lock
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RtuError {
    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a new timeout error
    ///
    /// # Arguments
    ///
    /// * `operation` - Description of the operation that timed out
    /// * `timeout_ms` - Timeout duration in milliseconds
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an incomplete frame error
    pub fn incomplete_frame(minimum: usize, actual: usize) -> Self {
        Self::IncompleteFrame { minimum, actual }
    }

    /// Create a CRC mismatch error
    ///
    /// # Arguments
    ///
    /// * `expected` - CRC computed over the received bytes
    /// * `actual` - CRC carried in the frame trailer
    pub fn crc_mismatch(expected: u16, actual: u16) -> Self {
        Self::CrcMismatch { expected, actual }
    }

    /// Create a unit mismatch error
    pub fn unit_mismatch(expected: u8, actual: u8) -> Self {
        Self::UnitMismatch { expected, actual }
    }

    /// Create an invalid function error
    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Create an invalid address error
    pub fn invalid_address(start: u16, count: u16, limit: u16) -> Self {
        Self::InvalidAddress { start, count, limit }
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData { message: message.into() }
    }

    /// Create a Modbus exception error
    ///
    /// Maps standard exception codes to human-readable messages.
    ///
    /// # Arguments
    ///
    /// * `function` - Original function code that caused the exception
    /// * `code` - Modbus exception code
    pub fn exception(function: u8, code: u8) -> Self {
        let message = match code {
            0x01 => "Illegal Function",
            0x02 => "Illegal Data Address",
            0x03 => "Illegal Data Value",
            0x04 => "Slave Device Failure",
            0x06 => "Slave Device Busy",
            _ => "Unknown Exception",
        }
        .to_string();

        Self::Exception { function, code, message }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if the error is a transport issue
    ///
    /// Identifies failures of the serial link itself rather than of the
    /// Modbus conversation running over it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rtu_stack::RtuError;
    ///
    /// let err = RtuError::connection("port open failed");
    /// assert!(err.is_transport_error());
    ///
    /// let err = RtuError::exception(0x03, 0x02);
    /// assert!(!err.is_transport_error());
    /// ```
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Connection { .. } | Self::Timeout { .. }
        )
    }

    /// Check if the error is a timeout
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rtu_stack::RtuError;
    ///
    /// let err = RtuError::timeout("read response", 1000);
    /// assert!(err.is_timeout());
    /// ```
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the error is a protocol issue
    ///
    /// Identifies frames that arrived but failed validation or carried an
    /// exception, as opposed to transport failures.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rtu_stack::RtuError;
    ///
    /// let err = RtuError::crc_mismatch(0x1234, 0x5678);
    /// assert!(err.is_protocol_error());
    ///
    /// let err = RtuError::io("read failed");
    /// assert!(!err.is_protocol_error());
    /// ```
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::IncompleteFrame { .. }
                | Self::CrcMismatch { .. }
                | Self::UnitMismatch { .. }
                | Self::InvalidFunction { .. }
                | Self::Exception { .. }
                | Self::Frame { .. }
        )
    }
}

/// Convert from std::io::Error
///
/// Preserves the original error message for debugging.
impl From<std::io::Error> for RtuError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Convert from tokio timeout errors
///
/// The generic conversion carries no duration; sites that know their
/// timeout construct the variant directly.
impl From<tokio::time::error::Elapsed> for RtuError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("Operation timeout", 0)
    }
}

/// Convert from serial port driver errors
impl From<tokio_serial::Error> for RtuError {
    fn from(err: tokio_serial::Error) -> Self {
        Self::connection(err.to_string())
    }
}

/// Convert from serde JSON errors
impl From<serde_json::Error> for RtuError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("JSON error: {}", err))
    }
}
