//! RTU master demo
//!
//! Opens a serial port and drives the companion slave demo: sets the run
//! coil, polls the counter register once a second, then clears the coil
//! again on shutdown so the counter freezes.
//!
//! Usage: `master_demo [config.json]`

use std::time::Duration;

use log::{error, info};
use tokio::signal;
use tokio::time::sleep;

use rtu_stack::{CallbackLogger, MasterConfig, RtuMaster, RtuResult};

fn load_config(path: Option<String>) -> RtuResult<MasterConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            let config = serde_json::from_str(&text)?;
            info!("Loaded master config from {}", path);
            Ok(config)
        }
        None => Ok(MasterConfig::default()),
    }
}

#[tokio::main]
async fn main() -> RtuResult<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("RTU Stack Master Demo v{}", rtu_stack::VERSION);
    println!("=============================");

    let config = load_config(std::env::args().nth(1))?;
    info!(
        "Port {} at {} baud, unit {}",
        config.link.port, config.link.baud_rate, config.unit_id
    );

    let master = RtuMaster::open(&config).with_logger(CallbackLogger::console());
    if !master.connect().await {
        error!("Failed to open {}", config.link.port);
        std::process::exit(1);
    }

    if master.write_coil(0, true).await {
        info!("Run coil set, counter is live");
    } else {
        error!("Write to run coil failed, is the slave demo running?");
    }

    println!("Polling holding register 0 every second, Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            _ = sleep(Duration::from_secs(1)) => {
                match master.read_holding(0, 1).await {
                    Some(registers) => info!("counter = {}", registers[0]),
                    None => error!("Read of holding register 0 failed"),
                }
            }
        }
    }

    info!("Stopping, clearing run coil");
    if !master.write_coil(0, false).await {
        error!("Write to run coil failed on shutdown");
    }

    if let Some(coils) = master.read_coils(0, 8).await {
        info!("Final coil state: {:?}", coils);
    }
    if let Some(registers) = master.read_holding(0, 1).await {
        info!("Final counter: {}", registers[0]);
    }

    let stats = master.get_stats().await;
    println!("Frames sent:     {}", stats.frames_sent);
    println!("Frames received: {}", stats.frames_received);
    println!("Timeouts:        {}", stats.timeouts);
    println!("Errors:          {}", stats.errors);

    master.close().await;
    println!("Master closed");
    Ok(())
}
