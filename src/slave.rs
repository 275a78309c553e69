//! # Slave Stream Dispatcher
//!
//! This module provides the RTU slave: a background loop that reads the
//! serial byte stream, reassembles fixed-length 8-byte request frames,
//! serves them from a shared [`RegisterStore`], and writes responses back.
//!
//! Dispatch rules follow shared-bus behavior:
//!
//! - frames addressed to another unit are dropped silently,
//! - frames failing CRC validation are dropped silently,
//! - unsupported function codes answer an IllegalFunction exception,
//! - out-of-range addresses answer an IllegalDataAddress exception,
//! - malformed coil values answer an IllegalDataValue exception.
//!
//! The loop uses bounded-timeout reads so it observes the broadcast stop
//! channel between read attempts; shutdown is cooperative, never forced.
//!
//! Frame reassembly is a plain fixed-8-byte split of the incoming stream.
//! There is no resynchronization: a dropped or extra byte misaligns frame
//! boundaries until restart.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{RtuError, RtuResult};
use crate::protocol::{self, ExceptionCode, FunctionCode, Request, UnitId, COIL_OFF, COIL_ON};
use crate::store::RegisterStore;
use crate::transport::{LinkConfig, RtuLink, SerialLink};

/// Read chunk size for the dispatcher loop
const READ_CHUNK_SIZE: usize = 256;

/// Slave configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveConfig {
    /// Serial link parameters
    pub link: LinkConfig,
    /// Unit id this slave answers to
    pub unit_id: UnitId,
    /// Number of coils in the register store
    pub coil_count: u16,
    /// Number of holding registers in the register store
    pub holding_count: u16,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            unit_id: crate::DEFAULT_UNIT_ID,
            coil_count: crate::DEFAULT_COIL_COUNT,
            holding_count: crate::DEFAULT_HOLDING_COUNT,
        }
    }
}

/// Dispatcher statistics
#[derive(Debug, Clone, Default)]
pub struct DispatcherStats {
    /// Complete 8-byte frames taken from the stream
    pub frames_received: u64,
    /// Frames dropped for unit mismatch or CRC failure
    pub frames_dropped: u64,
    /// Data and echo responses written back
    pub responses_sent: u64,
    /// Exception responses written back
    pub exceptions_sent: u64,
    /// Raw bytes taken off the wire
    pub bytes_received: u64,
}

/// RTU slave over any serial link
///
/// Generic over [`SerialLink`] so tests can feed the dispatcher from an
/// in-memory byte stream.
pub struct RtuSlave<L: SerialLink> {
    link: L,
    unit_id: UnitId,
    store: Arc<RegisterStore>,
    stats: DispatcherStats,
    /// Bytes read but not yet forming a complete frame
    pending: Vec<u8>,
}

impl RtuSlave<RtuLink> {
    /// Create a slave over a hardware serial port
    ///
    /// The store is created from the configured sizes; the port is not
    /// opened yet, call [`RtuSlave::connect`].
    pub fn from_config(config: &SlaveConfig) -> RtuResult<Self> {
        let store = Arc::new(RegisterStore::new(config.coil_count, config.holding_count)?);
        Ok(Self::new(
            RtuLink::from_config(&config.link),
            config.unit_id,
            store,
        ))
    }

    /// Open the serial port
    pub fn connect(&mut self) -> RtuResult<()> {
        self.link.connect()
    }
}

impl<L: SerialLink> RtuSlave<L> {
    /// Create a slave over an existing link with a shared store
    pub fn new(link: L, unit_id: UnitId, store: Arc<RegisterStore>) -> Self {
        Self {
            link,
            unit_id,
            store,
            stats: DispatcherStats::default(),
            pending: Vec::new(),
        }
    }

    /// Shared handle to the register store
    ///
    /// The simulation driver and the embedding application mutate slave
    /// state through this handle while the dispatcher is running.
    pub fn store(&self) -> Arc<RegisterStore> {
        Arc::clone(&self.store)
    }

    /// Dispatcher statistics so far
    pub fn stats(&self) -> DispatcherStats {
        self.stats.clone()
    }

    /// Run the dispatcher loop until the stop channel fires
    ///
    /// Consumes the slave and returns the final statistics once the stop
    /// signal is observed. Transport failures terminate the loop with an
    /// error; protocol-level problems never do.
    pub async fn start(mut self, mut stop: broadcast::Receiver<()>) -> RtuResult<DispatcherStats> {
        info!("Slave dispatcher started (unit {})", self.unit_id);

        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            tokio::select! {
                _ = stop.recv() => {
                    info!(
                        "Slave dispatcher stopping: {} frames received, {} dropped",
                        self.stats.frames_received, self.stats.frames_dropped
                    );
                    self.link.close().await?;
                    return Ok(self.stats);
                }
                result = self.link.read_available(&mut buf) => {
                    let n = result?;
                    if n == 0 {
                        continue;
                    }
                    self.stats.bytes_received += n as u64;
                    self.pending.extend_from_slice(&buf[..n]);
                    self.drain_frames().await?;
                }
            }
        }
    }

    /// Dispatch every complete frame currently buffered
    ///
    /// One read chunk can carry several back-to-back frames; all of them
    /// are answered before the next read.
    async fn drain_frames(&mut self) -> RtuResult<()> {
        while self.pending.len() >= crate::REQUEST_FRAME_LEN {
            let frame: Vec<u8> = self.pending.drain(..crate::REQUEST_FRAME_LEN).collect();
            if let Some(response) = self.dispatch(&frame) {
                if response[1] & 0x80 != 0 {
                    self.stats.exceptions_sent += 1;
                } else {
                    self.stats.responses_sent += 1;
                }
                self.link.write_frame(&response).await?;
            }
        }
        Ok(())
    }

    /// Dispatch one 8-byte request frame
    ///
    /// Returns the response to write back, or `None` for a silent drop.
    fn dispatch(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        self.stats.frames_received += 1;

        // Address filter first; foreign traffic is normal on a shared bus
        if frame[0] != self.unit_id {
            self.stats.frames_dropped += 1;
            debug!(
                "Ignoring frame for unit {} (this slave is unit {})",
                frame[0], self.unit_id
            );
            return None;
        }

        let request = match Request::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                self.stats.frames_dropped += 1;
                debug!("Dropping invalid frame: {}", e);
                return None;
            }
        };

        Some(self.handle_request(&request))
    }

    /// Serve a validated request from the register store
    fn handle_request(&self, request: &Request) -> Vec<u8> {
        match FunctionCode::from_u8(request.function) {
            Ok(FunctionCode::ReadCoils) => self.handle_read_coils(request),
            Ok(FunctionCode::ReadHoldingRegisters) => self.handle_read_holding(request),
            Ok(FunctionCode::WriteSingleCoil) => self.handle_write_coil(request),
            Err(_) => {
                debug!("Unsupported function 0x{:02X}", request.function);
                protocol::encode_exception(
                    self.unit_id,
                    request.function,
                    ExceptionCode::IllegalFunction,
                )
            }
        }
    }

    /// Read coils (0x01)
    fn handle_read_coils(&self, request: &Request) -> Vec<u8> {
        let quantity = request.value;
        match self.store.coil_range(request.address, quantity) {
            Ok(bits) => protocol::encode_bits_response(self.unit_id, &bits),
            Err(e) => self.store_exception(request, e),
        }
    }

    /// Read holding registers (0x03)
    fn handle_read_holding(&self, request: &Request) -> Vec<u8> {
        let quantity = request.value;
        match self.store.holding_range(request.address, quantity) {
            Ok(words) => protocol::encode_registers_response(self.unit_id, &words),
            Err(e) => self.store_exception(request, e),
        }
    }

    /// Write single coil (0x05)
    ///
    /// The value word must be exactly 0xFF00 or 0x0000; the response is a
    /// byte-for-byte echo of the request.
    fn handle_write_coil(&self, request: &Request) -> Vec<u8> {
        if request.value != COIL_ON && request.value != COIL_OFF {
            debug!("Malformed coil value 0x{:04X}", request.value);
            return protocol::encode_exception(
                self.unit_id,
                request.function,
                ExceptionCode::IllegalDataValue,
            );
        }

        match self.store.set_coil(request.address, request.coil_state()) {
            Ok(()) => request.encode_echo(),
            Err(e) => self.store_exception(request, e),
        }
    }

    /// Map a store failure to the exception frame it deserves
    fn store_exception(&self, request: &Request, error: RtuError) -> Vec<u8> {
        let code = match error {
            RtuError::InvalidAddress { .. } => ExceptionCode::IllegalDataAddress,
            ref other => {
                warn!("Store failure serving 0x{:02X}: {}", request.function, other);
                ExceptionCode::IllegalDataAddress
            }
        };
        protocol::encode_exception(self.unit_id, request.function, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LinkStats;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// In-memory link fed from scripted read chunks
    struct ScriptedLink {
        incoming: VecDeque<Vec<u8>>,
        written: Arc<StdMutex<Vec<Vec<u8>>>>,
        connected: bool,
    }

    impl ScriptedLink {
        fn new(incoming: Vec<Vec<u8>>) -> (Self, Arc<StdMutex<Vec<Vec<u8>>>>) {
            let written = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    incoming: incoming.into(),
                    written: Arc::clone(&written),
                    connected: true,
                },
                written,
            )
        }
    }

    #[async_trait]
    impl SerialLink for ScriptedLink {
        async fn write_frame(&mut self, frame: &[u8]) -> RtuResult<()> {
            self.written.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        async fn read_available(&mut self, buf: &mut [u8]) -> RtuResult<usize> {
            match self.incoming.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None => {
                    // Idle link: behave like a poll window elapsing
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(0)
                }
            }
        }

        async fn read_frame(&mut self, _first_byte_timeout: Duration) -> RtuResult<Vec<u8>> {
            Err(RtuError::timeout("read response", 0))
        }

        async fn clear_input(&mut self) -> RtuResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn close(&mut self) -> RtuResult<()> {
            self.connected = false;
            Ok(())
        }

        fn get_stats(&self) -> LinkStats {
            LinkStats::default()
        }
    }

    fn test_slave() -> RtuSlave<ScriptedLink> {
        let (link, _) = ScriptedLink::new(vec![]);
        RtuSlave::new(link, 1, Arc::new(RegisterStore::default()))
    }

    /// Craft an arbitrary 8-byte request with a valid CRC
    fn raw_request(unit: u8, function: u8, address: u16, value: u16) -> Vec<u8> {
        let mut frame = vec![unit, function];
        frame.extend_from_slice(&address.to_be_bytes());
        frame.extend_from_slice(&value.to_be_bytes());
        protocol::append_crc(frame)
    }

    #[test]
    fn test_write_coil_echo_and_mutation() {
        let mut slave = test_slave();
        let frame = protocol::encode_write_coil(1, 3, true);

        let response = slave.dispatch(&frame).expect("echo expected");
        assert_eq!(response, frame);
        assert!(slave.store.get_coil(3).unwrap());
    }

    #[test]
    fn test_read_coils_packed_bits() {
        let mut slave = test_slave();
        slave.store.set_coil(0, true).unwrap();
        slave.store.set_coil(2, true).unwrap();

        let frame = protocol::encode_read_coils(1, 0, 8);
        let response = slave.dispatch(&frame).expect("data response expected");

        // [unit][0x01][byte count][bits][crc]
        assert_eq!(&response[..4], &[0x01, 0x01, 0x01, 0b0000_0101]);
        assert!(protocol::verify_crc(&response).is_ok());
    }

    #[test]
    fn test_read_holding_words() {
        let mut slave = test_slave();
        slave.store.set_holding(1, 0x1234).unwrap();

        let frame = protocol::encode_read_holding(1, 0, 2);
        let response = slave.dispatch(&frame).expect("data response expected");

        assert_eq!(
            &response[..7],
            &[0x01, 0x03, 0x04, 0x00, 0x00, 0x12, 0x34]
        );
    }

    #[test]
    fn test_foreign_unit_silent_drop() {
        let mut slave = test_slave();
        let frame = protocol::encode_write_coil(2, 0, true);

        assert!(slave.dispatch(&frame).is_none());
        assert!(!slave.store.get_coil(0).unwrap());
        assert_eq!(slave.stats.frames_dropped, 1);
    }

    #[test]
    fn test_corrupt_crc_silent_drop() {
        let mut slave = test_slave();
        let mut frame = protocol::encode_write_coil(1, 0, true);
        frame[6] ^= 0x01;

        assert!(slave.dispatch(&frame).is_none());
        assert!(!slave.store.get_coil(0).unwrap());
        assert_eq!(slave.stats.frames_dropped, 1);
    }

    #[test]
    fn test_unsupported_function_exception() {
        let mut slave = test_slave();
        let frame = raw_request(1, 0x06, 0, 42);

        let response = slave.dispatch(&frame).expect("exception expected");
        assert_eq!(&response[..3], &[0x01, 0x86, 0x01]);
        assert!(protocol::verify_crc(&response).is_ok());
    }

    #[test]
    fn test_out_of_range_read_exception() {
        let mut slave = test_slave();
        let frame = protocol::encode_read_holding(1, 10, 10);

        let response = slave.dispatch(&frame).expect("exception expected");
        assert_eq!(&response[..3], &[0x01, 0x83, 0x02]);
    }

    #[test]
    fn test_out_of_range_write_exception() {
        let mut slave = test_slave();
        let frame = protocol::encode_write_coil(1, 100, true);

        let response = slave.dispatch(&frame).expect("exception expected");
        assert_eq!(&response[..3], &[0x01, 0x85, 0x02]);
    }

    #[test]
    fn test_malformed_coil_value_exception() {
        let mut slave = test_slave();
        let frame = raw_request(1, 0x05, 0, 0x1234);

        let response = slave.dispatch(&frame).expect("exception expected");
        assert_eq!(&response[..3], &[0x01, 0x85, 0x03]);
        assert!(!slave.store.get_coil(0).unwrap());
    }

    #[tokio::test]
    async fn test_loop_drains_back_to_back_frames() {
        // Two requests delivered in a single read chunk
        let mut chunk = protocol::encode_write_coil(1, 0, true);
        chunk.extend_from_slice(&protocol::encode_read_coils(1, 0, 1));

        let (link, written) = ScriptedLink::new(vec![chunk]);
        let store = Arc::new(RegisterStore::default());
        let slave = RtuSlave::new(link, 1, Arc::clone(&store));

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let handle = tokio::spawn(slave.start(stop_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(()).unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("dispatcher must stop on signal")
            .unwrap()
            .unwrap();

        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.responses_sent, 2);
        assert!(store.get_coil(0).unwrap());

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], protocol::encode_write_coil(1, 0, true));
        assert_eq!(&written[1][..4], &[0x01, 0x01, 0x01, 0x01]);
    }

    #[tokio::test]
    async fn test_partial_frame_waits_for_rest() {
        let frame = protocol::encode_write_coil(1, 5, true);
        let (first, second) = frame.split_at(3);

        let (link, written) = ScriptedLink::new(vec![first.to_vec(), second.to_vec()]);
        let store = Arc::new(RegisterStore::default());
        let slave = RtuSlave::new(link, 1, Arc::clone(&store));

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let handle = tokio::spawn(slave.start(stop_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(()).unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.frames_received, 1);
        assert!(store.get_coil(5).unwrap());
        assert_eq!(written.lock().unwrap().len(), 1);
    }
}
