//! # RTU Stack
//!
//! An async Modbus RTU protocol stack for serial lines, with both a
//! master (client) and a slave (server) side, built on Tokio.
//!
//! ## Features
//!
//! - **Master**: single-outstanding-request client with CRC checking,
//!   unit id filtering and configurable settle/read timeouts
//! - **Slave**: request dispatcher over a shared register store, with
//!   exception responses and silent drops per the RTU rules
//! - **Register store**: thread-safe coil and holding register arrays
//!   shared between the dispatcher and background tasks
//! - **Simulation driver**: fixed-tick task that animates the store
//!   (coil 0 gates a once-per-second counter into holding register 0)
//! - **Hand-rolled codec**: CRC16 and frame encode/decode with no
//!   dependency on an existing Modbus crate
//!
//! ## Supported function codes
//!
//! | Code | Function                |
//! |------|-------------------------|
//! | 0x01 | Read Coils              |
//! | 0x03 | Read Holding Registers  |
//! | 0x05 | Write Single Coil       |
//!
//! Anything else is answered with an Illegal Function exception by the
//! slave and rejected up front by the master.
//!
//! ## Quick start: master
//!
//! ```no_run
//! use rtu_stack::{MasterConfig, RtuMaster};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = MasterConfig::default();
//!     config.link.port = "/dev/ttyUSB0".to_string();
//!
//!     let master = RtuMaster::open(&config);
//!     if !master.connect().await {
//!         eprintln!("failed to open {}", config.link.port);
//!         return;
//!     }
//!
//!     master.write_coil(0, true).await;
//!     if let Some(registers) = master.read_holding(0, 1).await {
//!         println!("holding[0] = {}", registers[0]);
//!     }
//!     master.close().await;
//! }
//! ```
//!
//! ## Quick start: slave
//!
//! ```no_run
//! use rtu_stack::{RtuSlave, SlaveConfig};
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> rtu_stack::RtuResult<()> {
//!     let mut config = SlaveConfig::default();
//!     config.link.port = "/dev/ttyUSB1".to_string();
//!
//!     let mut slave = RtuSlave::from_config(&config)?;
//!     slave.connect()?;
//!
//!     let (stop_tx, stop_rx) = broadcast::channel(1);
//!     let handle = tokio::spawn(slave.start(stop_rx));
//!
//!     tokio::signal::ctrl_c().await?;
//!     let _ = stop_tx.send(());
//!     let stats = handle.await.map_err(|e| {
//!         rtu_stack::RtuError::internal(format!("dispatcher task failed: {}", e))
//!     })??;
//!     println!("served {} responses", stats.responses_sent);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------+     +-------------+     +----------------+
//! |  RtuMaster  | --> |  SerialLink | --> |  RtuSlave      |
//! |  (client)   | <-- |  (RTU wire) | <-- |  (dispatcher)  |
//! +-------------+     +-------------+     +-------+--------+
//!                                                 |
//!                                         +-------v--------+
//!                                         | RegisterStore  |<-- SimulationDriver
//!                                         | coils/holding  |
//!                                         +----------------+
//! ```

pub mod error;
pub mod logging;
pub mod master;
pub mod protocol;
pub mod sim;
pub mod slave;
pub mod store;
pub mod transport;
pub mod utils;

pub use error::{RtuError, RtuResult};
pub use logging::{CallbackLogger, LogCallback, LogLevel, LoggingMode};
pub use master::{MasterConfig, RtuMaster};
pub use protocol::{
    Address, ExceptionCode, FunctionCode, Request, Response, UnitId, COIL_OFF, COIL_ON,
};
pub use sim::SimulationDriver;
pub use slave::{DispatcherStats, RtuSlave, SlaveConfig};
pub use store::RegisterStore;
pub use transport::{LinkConfig, LinkStats, RtuLink, SerialLink};
pub use utils::LatestSlot;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request frames are always exactly this long on the wire
pub const REQUEST_FRAME_LEN: usize = 8;

/// Shortest well-formed response (exception frame)
pub const MIN_RESPONSE_LEN: usize = 5;

/// Largest RTU frame the link layer will buffer
pub const MAX_RTU_FRAME_SIZE: usize = 256;

/// Maximum coils in one read request
pub const MAX_COILS_PER_REQUEST: u16 = 2000;

/// Maximum holding registers in one read request
pub const MAX_REGISTERS_PER_REQUEST: u16 = 125;

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default slave poll timeout in milliseconds
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 50;

/// Default unit id for both sides
pub const DEFAULT_UNIT_ID: u8 = 1;

/// Default master settle delay between write and read, in milliseconds
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 50;

/// Default master response timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Default number of coils in a slave store
pub const DEFAULT_COIL_COUNT: u16 = 16;

/// Default number of holding registers in a slave store
pub const DEFAULT_HOLDING_COUNT: u16 = 16;

/// Default simulation tick interval in milliseconds
pub const DEFAULT_SIM_TICK_MS: u64 = 150;

/// Print library info
pub fn info() {
    println!("RTU Stack v{}", VERSION);
    println!("Async Modbus RTU master/slave for serial lines");
    println!(
        "Function codes: 0x01 Read Coils, 0x03 Read Holding Registers, 0x05 Write Single Coil"
    );
}
