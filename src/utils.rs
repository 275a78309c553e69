//! Utility functions and helpers
//!
//! Validation of externally supplied parameters, formatting helpers for
//! logs and console output, test logger setup, and the [`LatestSlot`]
//! hand-off container.

use std::sync::Mutex;
use std::time::Duration;

use crate::error::{RtuError, RtuResult};

/// Single-slot, latest-value-wins hand-off container
///
/// A background worker `put`s its most recent result; the foreground
/// consumer `take`s it whenever it gets around to it. An unread value is
/// overwritten by the next one, so the consumer always observes the
/// newest state and never a backlog.
#[derive(Debug, Default)]
pub struct LatestSlot<T> {
    slot: Mutex<Option<T>>,
}

impl<T> LatestSlot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Store a value, replacing any unread one
    pub fn put(&self, value: T) {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(value);
    }

    /// Remove and return the newest value, if any
    pub fn take(&self) -> Option<T> {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    /// Check whether a value is waiting
    pub fn is_empty(&self) -> bool {
        let guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        guard.is_none()
    }
}

/// Data validation utilities
pub mod validation {
    use super::*;

    /// Validate unit id (1-247)
    pub fn validate_unit_id(unit_id: u8) -> RtuResult<()> {
        if unit_id == 0 || unit_id > 247 {
            return Err(RtuError::invalid_data(format!(
                "Invalid unit id: {} (must be 1-247)",
                unit_id
            )));
        }
        Ok(())
    }

    /// Validate that an address range stays within the 16-bit space
    pub fn validate_address_range(start: u16, count: u16) -> RtuResult<()> {
        if count == 0 || (start as u32 + count as u32) > 65536 {
            return Err(RtuError::invalid_address(start, count, u16::MAX));
        }
        Ok(())
    }
}

/// Formatting and display utilities
pub mod format {
    use super::*;

    /// Format byte array as hex string
    pub fn bytes_to_hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format register values as hex
    pub fn registers_to_hex(registers: &[u16]) -> String {
        registers
            .iter()
            .map(|r| format!("{:04X}", r))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format duration in a human-readable way
    pub fn format_duration(duration: Duration) -> String {
        let millis = duration.as_millis();
        if millis < 1000 {
            format!("{}ms", millis)
        } else if millis < 60_000 {
            format!("{:.2}s", duration.as_secs_f64())
        } else {
            let mins = millis / 60_000;
            let secs = (millis % 60_000) as f64 / 1000.0;
            format!("{}m {:.1}s", mins, secs)
        }
    }
}

/// Logging utilities
pub mod logging {
    /// Initialize simple logger for testing
    pub fn init_test_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }
}
