//! Integration tests
//!
//! Master and slave talking over an in-memory duplex pipe, no serial
//! hardware involved. Each end of the pipe is wrapped in a `SerialLink`
//! implementation that mimics the pacing of a real port, so the full
//! request/response path (codec, dispatcher, store) is exercised
//! end to end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

use rtu_stack::protocol::{append_crc, verify_crc};
use rtu_stack::utils::logging::init_test_logger;
use rtu_stack::{
    DispatcherStats, LinkStats, RegisterStore, RtuError, RtuMaster, RtuResult, RtuSlave,
    SerialLink, SimulationDriver,
};

const PIPE_CAPACITY: usize = 512;

/// One end of an in-memory serial line
struct PipeLink {
    pipe: DuplexStream,
    connected: bool,
    stats: LinkStats,
}

impl PipeLink {
    fn new(pipe: DuplexStream) -> Self {
        Self {
            pipe,
            connected: true,
            stats: LinkStats::default(),
        }
    }

    fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
        (Self::new(a), Self::new(b))
    }
}

#[async_trait]
impl SerialLink for PipeLink {
    async fn write_frame(&mut self, frame: &[u8]) -> RtuResult<()> {
        self.pipe.write_all(frame).await?;
        self.pipe.flush().await?;
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> RtuResult<usize> {
        match timeout(Duration::from_millis(10), self.pipe.read(buf)).await {
            Ok(Ok(n)) => {
                self.stats.bytes_received += n as u64;
                Ok(n)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(0),
        }
    }

    async fn read_frame(&mut self, first_byte_timeout: Duration) -> RtuResult<Vec<u8>> {
        let mut chunk = [0u8; 256];
        let n = match timeout(first_byte_timeout, self.pipe.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                self.stats.timeouts += 1;
                return Err(RtuError::timeout(
                    "response read",
                    first_byte_timeout.as_millis() as u64,
                ));
            }
        };
        if n == 0 {
            return Err(RtuError::incomplete_frame(1, 0));
        }

        let mut frame = chunk[..n].to_vec();
        loop {
            match timeout(Duration::from_millis(5), self.pipe.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => frame.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }
        }

        self.stats.frames_received += 1;
        self.stats.bytes_received += frame.len() as u64;
        Ok(frame)
    }

    async fn clear_input(&mut self) -> RtuResult<()> {
        let mut chunk = [0u8; 256];
        while let Ok(Ok(n)) = timeout(Duration::from_millis(1), self.pipe.read(&mut chunk)).await {
            if n == 0 {
                break;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> RtuResult<()> {
        self.connected = false;
        self.pipe.shutdown().await?;
        Ok(())
    }

    fn get_stats(&self) -> LinkStats {
        self.stats.clone()
    }
}

/// A master wired to a running slave over a pipe
struct Bench {
    master: RtuMaster<PipeLink>,
    store: Arc<RegisterStore>,
    stop_tx: broadcast::Sender<()>,
    slave_handle: tokio::task::JoinHandle<RtuResult<DispatcherStats>>,
}

impl Bench {
    fn spawn(master_unit: u8, slave_unit: u8) -> Self {
        let (master_end, slave_end) = PipeLink::pair();
        let store = Arc::new(RegisterStore::default());
        let slave = RtuSlave::new(slave_end, slave_unit, Arc::clone(&store));

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let slave_handle = tokio::spawn(slave.start(stop_rx));

        let master = RtuMaster::with_settings(
            master_end,
            master_unit,
            Duration::ZERO,
            Duration::from_millis(200),
        );

        Self {
            master,
            store,
            stop_tx,
            slave_handle,
        }
    }

    async fn shutdown(self) -> DispatcherStats {
        let _ = self.stop_tx.send(());
        timeout(Duration::from_secs(1), self.slave_handle)
            .await
            .expect("dispatcher must stop on signal")
            .expect("dispatcher task must not panic")
            .expect("dispatcher must exit cleanly")
    }
}

/// A raw pipe end wired to a running slave, for injecting hand-built frames
struct RawBench {
    wire: DuplexStream,
    store: Arc<RegisterStore>,
    stop_tx: broadcast::Sender<()>,
    slave_handle: tokio::task::JoinHandle<RtuResult<DispatcherStats>>,
}

impl RawBench {
    fn spawn(slave_unit: u8) -> Self {
        let (wire, slave_end) = tokio::io::duplex(PIPE_CAPACITY);
        let store = Arc::new(RegisterStore::default());
        let slave = RtuSlave::new(PipeLink::new(slave_end), slave_unit, Arc::clone(&store));

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let slave_handle = tokio::spawn(slave.start(stop_rx));

        Self {
            wire,
            store,
            stop_tx,
            slave_handle,
        }
    }

    async fn shutdown(self) -> DispatcherStats {
        let _ = self.stop_tx.send(());
        timeout(Duration::from_secs(1), self.slave_handle)
            .await
            .expect("dispatcher must stop on signal")
            .expect("dispatcher task must not panic")
            .expect("dispatcher must exit cleanly")
    }
}

#[tokio::test]
async fn test_write_coil_round_trip() {
    init_test_logger();
    let bench = Bench::spawn(1, 1);

    assert!(bench.master.write_coil(3, true).await);
    assert!(bench.store.get_coil(3).unwrap());

    assert!(bench.master.write_coil(3, false).await);
    assert!(!bench.store.get_coil(3).unwrap());

    let stats = bench.shutdown().await;
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.responses_sent, 2);
    assert_eq!(stats.frames_dropped, 0);
}

#[tokio::test]
async fn test_reads_reflect_store_contents() {
    let bench = Bench::spawn(1, 1);

    bench.store.set_coil(0, true).unwrap();
    bench.store.set_coil(2, true).unwrap();
    bench.store.set_holding(0, 0x1234).unwrap();
    bench.store.set_holding(1, 0xBEEF).unwrap();

    let coils = bench.master.read_coils(0, 4).await.unwrap();
    assert_eq!(coils, vec![true, false, true, false]);

    let registers = bench.master.read_holding(0, 3).await.unwrap();
    assert_eq!(registers, vec![0x1234, 0xBEEF, 0]);

    bench.shutdown().await;
}

#[tokio::test]
async fn test_write_coil_wire_format() {
    let (master_end, mut wire) = tokio::io::duplex(PIPE_CAPACITY);
    let master = RtuMaster::with_settings(
        PipeLink::new(master_end),
        1,
        Duration::ZERO,
        Duration::from_millis(50),
    );

    // Nobody answers, so the call itself reports failure
    assert!(!master.write_coil(0, true).await);

    let mut frame = [0u8; 8];
    timeout(Duration::from_millis(100), wire.read_exact(&mut frame))
        .await
        .expect("request must be on the wire")
        .unwrap();
    assert_eq!(frame, [0x01, 0x05, 0x00, 0x00, 0xFF, 0x00, 0x8C, 0x3A]);
}

#[tokio::test]
async fn test_corrupt_checksum_is_dropped_silently() {
    let mut bench = RawBench::spawn(1);

    let mut frame = append_crc(vec![0x01, 0x05, 0x00, 0x00, 0xFF, 0x00]);
    frame[6] ^= 0xFF;
    bench.wire.write_all(&frame).await.unwrap();

    let mut buf = [0u8; 64];
    let got = timeout(Duration::from_millis(100), bench.wire.read(&mut buf)).await;
    assert!(got.is_err(), "corrupt frame must get no response");
    assert!(!bench.store.get_coil(0).unwrap(), "corrupt frame must not mutate");

    let stats = bench.shutdown().await;
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.responses_sent, 0);
}

#[tokio::test]
async fn test_foreign_unit_is_ignored() {
    let bench = Bench::spawn(2, 1);

    assert!(!bench.master.write_coil(0, true).await);
    assert!(bench.master.read_holding(0, 1).await.is_none());
    assert!(!bench.store.get_coil(0).unwrap());

    let stats = bench.shutdown().await;
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.frames_dropped, 2);
    assert_eq!(stats.responses_sent, 0);
}

#[tokio::test]
async fn test_unsupported_function_yields_exception_frame() {
    let mut bench = RawBench::spawn(1);

    // Write-multiple-coils is not served
    let frame = append_crc(vec![0x01, 0x0F, 0x00, 0x00, 0x00, 0x01]);
    bench.wire.write_all(&frame).await.unwrap();

    let mut response = [0u8; 5];
    timeout(Duration::from_millis(200), bench.wire.read_exact(&mut response))
        .await
        .expect("exception frame expected")
        .unwrap();

    assert_eq!(response[0], 0x01);
    assert_eq!(response[1], 0x8F);
    assert_eq!(response[2], 0x01);
    verify_crc(&response).unwrap();

    let stats = bench.shutdown().await;
    assert_eq!(stats.exceptions_sent, 1);
    assert_eq!(stats.responses_sent, 0);
}

#[tokio::test]
async fn test_out_of_range_read_is_refused() {
    // Default store holds 16 registers
    let bench = Bench::spawn(1, 1);

    assert!(bench.master.read_holding(100, 5).await.is_none());
    assert!(bench.master.read_coils(10, 10).await.is_none());

    let stats = bench.shutdown().await;
    assert_eq!(stats.exceptions_sent, 2);
    assert_eq!(stats.frames_dropped, 0);
}

#[tokio::test]
async fn test_counter_scenario_end_to_end() {
    init_test_logger();
    let bench = Bench::spawn(1, 1);
    let mut sim = SimulationDriver::new(Arc::clone(&bench.store));
    let t0 = Instant::now();

    // Coil clear: the counter stays frozen at zero
    assert!(!sim.tick_at(t0).unwrap());
    assert_eq!(bench.master.read_holding(0, 1).await.unwrap(), vec![0]);

    // Master starts the counter
    assert!(bench.master.write_coil(0, true).await);
    assert!(sim.tick_at(t0).unwrap());
    assert_eq!(bench.master.read_holding(0, 1).await.unwrap(), vec![1]);

    assert!(sim.tick_at(t0 + Duration::from_secs(1)).unwrap());
    assert_eq!(bench.master.read_holding(0, 1).await.unwrap(), vec![2]);

    // Master freezes the counter again
    assert!(bench.master.write_coil(0, false).await);
    assert!(!sim.tick_at(t0 + Duration::from_secs(5)).unwrap());
    assert_eq!(bench.master.read_holding(0, 1).await.unwrap(), vec![2]);

    bench.shutdown().await;
}

#[tokio::test]
async fn test_sequential_transactions_share_one_link() {
    let bench = Bench::spawn(1, 1);

    for i in 0..8u16 {
        assert!(bench.master.write_coil(i, true).await);
    }
    let coils = bench.master.read_coils(0, 16).await.unwrap();
    assert_eq!(coils[..8], [true; 8]);
    assert_eq!(coils[8..], [false; 8]);

    let link_stats = bench.master.get_stats().await;
    assert_eq!(link_stats.frames_sent, 9);
    assert_eq!(link_stats.frames_received, 9);
    assert_eq!(link_stats.timeouts, 0);

    let stats = bench.shutdown().await;
    assert_eq!(stats.responses_sent, 9);
    assert_eq!(stats.frames_dropped, 0);
}
