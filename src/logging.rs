//! Callback-based packet logging
//!
//! The stack logs its own operation through the `log` crate; this module
//! is the optional per-transaction sink an embedding application can hook
//! to capture raw and interpreted frames (for a traffic monitor, a debug
//! console, or a test harness).

use std::sync::Arc;

use crate::protocol::{COIL_ON, ExceptionCode};

/// Log levels for the callback logging system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Error messages
    Error,
    /// Warning messages
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
}

/// Logging mode for packet display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// Show raw frame bytes only
    Raw,
    /// Show interpreted frames with field descriptions
    Interpreted,
    /// Show both raw and interpreted data
    Both,
}

impl LogLevel {
    /// Convert log level to string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Type alias for log callback functions
///
/// The callback receives a log level and message string
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Logger that uses callbacks for flexible logging
#[derive(Clone)]
pub struct CallbackLogger {
    callback: Option<Arc<LogCallback>>,
    min_level: LogLevel,
    mode: LoggingMode,
}

impl CallbackLogger {
    /// Create a new callback logger
    pub fn new(callback: Option<LogCallback>, min_level: LogLevel) -> Self {
        Self {
            callback: callback.map(Arc::new),
            min_level,
            mode: LoggingMode::Interpreted,
        }
    }

    /// Create a new callback logger with specific mode
    pub fn with_mode(callback: Option<LogCallback>, min_level: LogLevel, mode: LoggingMode) -> Self {
        Self {
            callback: callback.map(Arc::new),
            min_level,
            mode,
        }
    }

    /// Create a logger with default console output
    pub fn console() -> Self {
        let callback: LogCallback = Box::new(|level, message| {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
            match level {
                LogLevel::Error => eprintln!("[{}] ERROR: {}", timestamp, message),
                LogLevel::Warn => eprintln!("[{}] WARN: {}", timestamp, message),
                LogLevel::Info => println!("[{}] INFO: {}", timestamp, message),
                LogLevel::Debug => println!("[{}] DEBUG: {}", timestamp, message),
            }
        });
        Self::new(Some(callback), LogLevel::Info)
    }

    /// Create a logger that outputs nothing (disabled)
    pub fn disabled() -> Self {
        Self::new(None, LogLevel::Error)
    }

    /// Set logging mode
    pub fn set_mode(&mut self, mode: LoggingMode) {
        self.mode = mode;
    }

    /// Get current logging mode
    pub fn get_mode(&self) -> LoggingMode {
        self.mode
    }

    /// Log a message at the specified level
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.should_log(level) {
            if let Some(ref callback) = self.callback {
                callback(level, message);
            }
        }
    }

    /// Log an error message
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Log a warning message
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Log an info message
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log a debug message
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Check if a message at the given level should be logged
    fn should_log(&self, level: LogLevel) -> bool {
        self.callback.is_some() && level as u8 <= self.min_level as u8
    }

    /// Log packet data with hex dump
    pub fn log_packet(&self, level: LogLevel, direction: &str, data: &[u8]) {
        if !self.should_log(level) {
            return;
        }

        let hex_data = data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");

        let message = format!("{} packet ({} bytes): {}", direction, data.len(), hex_data);
        self.log(level, &message);
    }

    /// Log an RTU request with the current mode
    ///
    /// `value` carries the quantity for reads and the coil state word for
    /// writes; `frame` is the raw bytes as sent, CRC included.
    pub fn log_request(&self, unit_id: u8, function: u8, address: u16, value: u16, frame: &[u8]) {
        match self.mode {
            LoggingMode::Raw => {
                let message = format!("RTU Request -> Raw: {}", hex_frame(frame));
                self.info(&message);
            }
            LoggingMode::Interpreted => {
                self.info(&Self::interpret_request(unit_id, function, address, value));
            }
            LoggingMode::Both => {
                self.info(&Self::interpret_request(unit_id, function, address, value));
                let raw_message = format!("RTU Request -> Raw: {}", hex_frame(frame));
                self.debug(&raw_message);
            }
        }
    }

    /// Log an RTU response with the current mode
    ///
    /// `data` is the payload between function code and CRC; `frame` is the
    /// raw bytes as received.
    pub fn log_response(&self, unit_id: u8, function: u8, data: &[u8], frame: &[u8]) {
        match self.mode {
            LoggingMode::Raw => {
                let message = format!("RTU Response <- Raw: {}", hex_frame(frame));
                self.info(&message);
            }
            LoggingMode::Interpreted => {
                self.info(&Self::interpret_response(unit_id, function, data));
            }
            LoggingMode::Both => {
                self.info(&Self::interpret_response(unit_id, function, data));
                let raw_message = format!("RTU Response <- Raw: {}", hex_frame(frame));
                self.debug(&raw_message);
            }
        }
    }

    fn interpret_request(unit_id: u8, function: u8, address: u16, value: u16) -> String {
        let detail = match function {
            0x01 | 0x03 => format!("Address: {}, Quantity: {}", address, value),
            0x05 => format!(
                "Address: {}, Value: 0x{:04X} ({})",
                address,
                value,
                if value == COIL_ON { "ON" } else { "OFF" }
            ),
            _ => format!("Address: {}, Value: {}", address, value),
        };
        format!(
            "RTU Request -> Unit: {}, Function: {} (0x{:02X}), {}",
            unit_id,
            function_name(function),
            function,
            detail
        )
    }

    fn interpret_response(unit_id: u8, function: u8, data: &[u8]) -> String {
        format!(
            "RTU Response <- Unit: {}, Function: {} (0x{:02X}), {}",
            unit_id,
            function_name(function),
            function,
            interpret_response_data(function, data)
        )
    }
}

impl Default for CallbackLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

fn hex_frame(frame: &[u8]) -> String {
    frame
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Get human-readable function name
fn function_name(function: u8) -> &'static str {
    match function {
        0x01 => "Read Coils",
        0x03 => "Read Holding Registers",
        0x05 => "Write Single Coil",
        f if f & 0x80 != 0 => "Exception",
        _ => "Unknown Function",
    }
}

/// Interpret response payload based on function code
fn interpret_response_data(function: u8, data: &[u8]) -> String {
    if data.is_empty() {
        return "No data".to_string();
    }

    match function {
        0x01 => {
            if data.len() >= 2 {
                let byte_count = data[0];
                let mut coils = Vec::new();
                for byte in data.iter().skip(1).take(byte_count as usize) {
                    for bit in 0..8 {
                        coils.push((byte & (1 << bit)) != 0);
                    }
                }
                format!(
                    "Byte count: {}, Coils: {:?}",
                    byte_count,
                    &coils[..coils.len().min(16)]
                )
            } else {
                format!("Data: {}", hex::encode(data))
            }
        }
        0x03 => {
            if data.len() >= 3 {
                let byte_count = data[0];
                let mut registers = Vec::new();
                for chunk in data[1..].chunks_exact(2) {
                    registers.push(u16::from_be_bytes([chunk[0], chunk[1]]));
                }
                format!(
                    "Byte count: {}, Registers: {:?}",
                    byte_count,
                    &registers[..registers.len().min(8)]
                )
            } else {
                format!("Data: {}", hex::encode(data))
            }
        }
        0x05 => {
            if data.len() >= 4 {
                let address = u16::from_be_bytes([data[0], data[1]]);
                let value = u16::from_be_bytes([data[2], data[3]]);
                format!(
                    "Address: {}, Value: 0x{:04X} ({})",
                    address,
                    value,
                    if value == COIL_ON { "ON" } else { "OFF" }
                )
            } else {
                format!("Data: {}", hex::encode(data))
            }
        }
        f if f & 0x80 != 0 => {
            let description = ExceptionCode::from_u8(data[0])
                .map(|code| code.description())
                .unwrap_or("Unknown Exception");
            format!("Exception code: 0x{:02X} ({})", data[0], description)
        }
        _ => format!("Data: {}", hex::encode(data)),
    }
}

/// Convenience macro for creating a simple console logger
#[macro_export]
macro_rules! console_logger {
    () => {
        $crate::logging::CallbackLogger::console()
    };
}

/// Convenience macro for creating a custom logger
#[macro_export]
macro_rules! custom_logger {
    ($callback:expr) => {
        $crate::logging::CallbackLogger::new(Some($callback), $crate::logging::LogLevel::Info)
    };
    ($callback:expr, $level:expr) => {
        $crate::logging::CallbackLogger::new(Some($callback), $level)
    };
    ($callback:expr, $level:expr, $mode:expr) => {
        $crate::logging::CallbackLogger::with_mode(Some($callback), $level, $mode)
    };
}
