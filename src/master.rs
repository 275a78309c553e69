//! # Master Transaction Engine
//!
//! This module provides the RTU master: a request/response engine that
//! runs one transaction at a time over a [`SerialLink`].
//!
//! A transaction is the full sequence: clear the input buffer, write the
//! request frame, wait a short settle delay, collect the response within a
//! bounded read window, then validate and decode it. Transactions serialize
//! on an async mutex over the link, so the engine can be shared across
//! tasks without interleaving frames on the wire.
//!
//! The public operations deliberately do not surface [`RtuError`]: a
//! polling loop wants "did it work and what came back", so writes return
//! `bool` and reads return `Option`. Failures are logged, and the typed
//! error machinery stays internal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rtu_stack::master::{MasterConfig, RtuMaster};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = MasterConfig::default();
//!     let master = RtuMaster::open(&config);
//!
//!     if !master.connect().await {
//!         eprintln!("serial port unavailable");
//!         return;
//!     }
//!
//!     if master.write_coil(0, true).await {
//!         if let Some(words) = master.read_holding(0, 2).await {
//!             println!("holding registers: {:?}", words);
//!         }
//!     }
//!
//!     master.close().await;
//! }
//! ```

use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{RtuError, RtuResult};
use crate::logging::CallbackLogger;
use crate::protocol::{self, Address, FunctionCode, Response, UnitId, COIL_OFF, COIL_ON};
use crate::transport::{LinkConfig, LinkStats, RtuLink, SerialLink};

/// Master configuration
///
/// Combines the serial link parameters with the transaction pacing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Serial link parameters
    pub link: LinkConfig,
    /// Unit id of the slave this master talks to
    pub unit_id: UnitId,
    /// Delay between writing a request and reading the response, in ms
    pub settle_delay_ms: u64,
    /// Window for the first response byte, in ms
    pub read_timeout_ms: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            unit_id: crate::DEFAULT_UNIT_ID,
            settle_delay_ms: crate::DEFAULT_SETTLE_DELAY_MS,
            read_timeout_ms: crate::DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

/// RTU master over any serial link
///
/// Generic over [`SerialLink`] so tests can drive the full transaction
/// sequence against an in-memory link.
pub struct RtuMaster<L: SerialLink> {
    link: Mutex<L>,
    unit_id: UnitId,
    settle_delay: Duration,
    read_timeout: Duration,
    logger: Option<CallbackLogger>,
}

impl RtuMaster<RtuLink> {
    /// Create a master over a hardware serial port
    ///
    /// The port is not opened yet; call [`RtuMaster::connect`].
    pub fn open(config: &MasterConfig) -> Self {
        Self::with_settings(
            RtuLink::from_config(&config.link),
            config.unit_id,
            Duration::from_millis(config.settle_delay_ms),
            Duration::from_millis(config.read_timeout_ms),
        )
    }

    /// Open the serial port
    ///
    /// Returns `true` when the port is ready for transactions. A failure
    /// is logged and reported as `false`; the master can retry later.
    pub async fn connect(&self) -> bool {
        let mut link = self.link.lock().await;
        match link.connect() {
            Ok(()) => true,
            Err(e) => {
                warn!("Master connect failed: {}", e);
                false
            }
        }
    }
}

impl<L: SerialLink> RtuMaster<L> {
    /// Create a master over an existing link with default pacing
    pub fn new(link: L, unit_id: UnitId) -> Self {
        Self::with_settings(
            link,
            unit_id,
            Duration::from_millis(crate::DEFAULT_SETTLE_DELAY_MS),
            Duration::from_millis(crate::DEFAULT_READ_TIMEOUT_MS),
        )
    }

    /// Create a master with explicit pacing parameters
    pub fn with_settings(
        link: L,
        unit_id: UnitId,
        settle_delay: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            link: Mutex::new(link),
            unit_id,
            settle_delay,
            read_timeout,
            logger: None,
        }
    }

    /// Attach a packet logger to this master
    pub fn with_logger(mut self, logger: CallbackLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Unit id this master addresses
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    /// Check if the underlying link is open
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_connected()
    }

    /// Close the underlying link
    pub async fn close(&self) {
        let mut link = self.link.lock().await;
        if let Err(e) = link.close().await {
            warn!("Master close failed: {}", e);
        }
    }

    /// Get transfer statistics from the underlying link
    pub async fn get_stats(&self) -> LinkStats {
        self.link.lock().await.get_stats()
    }

    /// Write a single coil (function code 0x05)
    ///
    /// Returns `true` when the slave echoed the request back intact.
    pub async fn write_coil(&self, address: Address, value: bool) -> bool {
        let frame = protocol::encode_write_coil(self.unit_id, address, value);
        let word = if value { COIL_ON } else { COIL_OFF };

        match self
            .transact(frame, FunctionCode::WriteSingleCoil, address, word)
            .await
        {
            Ok(_) => {
                debug!("write_coil addr={} value={} ok", address, value);
                true
            }
            Err(e) => {
                warn!("write_coil addr={} value={} failed: {}", address, value, e);
                false
            }
        }
    }

    /// Read coils (function code 0x01)
    ///
    /// Returns the coil states, or `None` when the transaction failed.
    pub async fn read_coils(&self, address: Address, quantity: u16) -> Option<Vec<bool>> {
        if let Err(e) = validate_bit_quantity(quantity) {
            warn!("read_coils addr={} count={} rejected: {}", address, quantity, e);
            return None;
        }

        let frame = protocol::encode_read_coils(self.unit_id, address, quantity);
        let result = self
            .transact(frame, FunctionCode::ReadCoils, address, quantity)
            .await
            .and_then(|response| response.parse_bits(quantity));

        match result {
            Ok(bits) => {
                debug!("read_coils addr={} count={} ok", address, quantity);
                Some(bits)
            }
            Err(e) => {
                warn!("read_coils addr={} count={} failed: {}", address, quantity, e);
                None
            }
        }
    }

    /// Read holding registers (function code 0x03)
    ///
    /// Returns the register words, or `None` when the transaction failed
    /// or the slave returned a different count than requested.
    pub async fn read_holding(&self, address: Address, quantity: u16) -> Option<Vec<u16>> {
        if let Err(e) = validate_register_quantity(quantity) {
            warn!("read_holding addr={} count={} rejected: {}", address, quantity, e);
            return None;
        }

        let frame = protocol::encode_read_holding(self.unit_id, address, quantity);
        let result = self
            .transact(frame, FunctionCode::ReadHoldingRegisters, address, quantity)
            .await
            .and_then(|response| {
                let words = response.parse_registers()?;
                if words.len() != quantity as usize {
                    return Err(RtuError::invalid_data(format!(
                        "Register count mismatch: requested {}, received {}",
                        quantity,
                        words.len()
                    )));
                }
                Ok(words)
            });

        match result {
            Ok(words) => {
                debug!("read_holding addr={} count={} ok", address, quantity);
                Some(words)
            }
            Err(e) => {
                warn!("read_holding addr={} count={} failed: {}", address, quantity, e);
                None
            }
        }
    }

    /// Run one transaction over the link
    ///
    /// Holds the link mutex for the full sequence so concurrent callers
    /// never interleave frames on the wire.
    async fn transact(
        &self,
        request: Vec<u8>,
        function: FunctionCode,
        address: Address,
        value: u16,
    ) -> RtuResult<Response> {
        if let Some(ref logger) = self.logger {
            logger.log_request(self.unit_id, function.to_u8(), address, value, &request);
        }

        let mut link = self.link.lock().await;

        link.clear_input().await?;
        link.write_frame(&request).await?;

        // Give the slave its turnaround time before expecting bytes back
        tokio::time::sleep(self.settle_delay).await;

        let raw = link.read_frame(self.read_timeout).await?;
        drop(link);

        let response = validate_response(&raw, self.unit_id, function)?;

        if let Some(ref logger) = self.logger {
            logger.log_response(response.unit_id, response.function, &response.data, &raw);
        } else {
            debug!(
                "{} response: {} payload bytes",
                function,
                response.data.len()
            );
        }

        Ok(response)
    }
}

/// Validate a raw response buffer against the request it answers
///
/// Checks run in a fixed order: minimum length, CRC trailer, unit id,
/// exception bit, function echo. The first failure wins, so a corrupt
/// frame reports the earliest problem rather than a misleading later one.
fn validate_response(raw: &[u8], unit_id: UnitId, function: FunctionCode) -> RtuResult<Response> {
    if raw.len() < crate::MIN_RESPONSE_LEN {
        return Err(RtuError::incomplete_frame(crate::MIN_RESPONSE_LEN, raw.len()));
    }
    protocol::verify_crc(raw)?;

    if raw[0] != unit_id {
        return Err(RtuError::unit_mismatch(unit_id, raw[0]));
    }

    // Exception bit and payload extraction
    let response = Response::decode(raw)?;

    let expected = function.to_u8();
    if response.function != expected {
        return Err(RtuError::frame(format!(
            "Function echo mismatch: sent {:02X}, received {:02X}",
            expected, response.function
        )));
    }

    Ok(response)
}

fn validate_bit_quantity(quantity: u16) -> RtuResult<()> {
    if quantity == 0 || quantity > crate::MAX_COILS_PER_REQUEST {
        return Err(RtuError::invalid_data(format!(
            "Invalid coil count: {} (must be 1-{})",
            quantity,
            crate::MAX_COILS_PER_REQUEST
        )));
    }
    Ok(())
}

fn validate_register_quantity(quantity: u16) -> RtuResult<()> {
    if quantity == 0 || quantity > crate::MAX_REGISTERS_PER_REQUEST {
        return Err(RtuError::invalid_data(format!(
            "Invalid register count: {} (must be 1-{})",
            quantity,
            crate::MAX_REGISTERS_PER_REQUEST
        )));
    }
    Ok(())
}
