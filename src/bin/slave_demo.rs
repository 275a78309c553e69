//! RTU slave demo
//!
//! Opens a serial port, serves the register store on it, and runs the
//! simulation driver alongside: while coil 0 is set, holding register 0
//! counts up once a second. Pair it with `master_demo` on the other end
//! of the line.
//!
//! Usage: `slave_demo [config.json]`

use std::sync::Arc;

use log::{error, info};
use tokio::signal;
use tokio::sync::broadcast;

use rtu_stack::{RtuError, RtuResult, RtuSlave, SimulationDriver, SlaveConfig};

fn load_config(path: Option<String>) -> RtuResult<SlaveConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            let config = serde_json::from_str(&text)?;
            info!("Loaded slave config from {}", path);
            Ok(config)
        }
        None => Ok(SlaveConfig::default()),
    }
}

#[tokio::main]
async fn main() -> RtuResult<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("RTU Stack Slave Demo v{}", rtu_stack::VERSION);
    println!("============================");

    let config = load_config(std::env::args().nth(1))?;
    info!(
        "Port {} at {} baud, unit {}, {} coils / {} holding registers",
        config.link.port,
        config.link.baud_rate,
        config.unit_id,
        config.coil_count,
        config.holding_count
    );

    let mut slave = RtuSlave::from_config(&config)?;
    slave.connect()?;
    let store = slave.store();

    let simulation = SimulationDriver::new(Arc::clone(&store));
    let (stop_tx, _) = broadcast::channel(1);

    let slave_handle = tokio::spawn(slave.start(stop_tx.subscribe()));
    let sim_handle = tokio::spawn(simulation.run(stop_tx.subscribe()));

    println!("Serving unit {} on {}, Ctrl+C to stop", config.unit_id, config.link.port);

    signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    let _ = stop_tx.send(());

    if let Err(e) = join(sim_handle).await {
        error!("Simulation driver failed: {}", e);
    }

    let stats = join(slave_handle).await?;
    println!("Frames received:  {}", stats.frames_received);
    println!("Frames dropped:   {}", stats.frames_dropped);
    println!("Responses sent:   {}", stats.responses_sent);
    println!("Exceptions sent:  {}", stats.exceptions_sent);
    println!("Bytes received:   {}", stats.bytes_received);

    println!("Slave stopped");
    Ok(())
}

async fn join<T>(handle: tokio::task::JoinHandle<RtuResult<T>>) -> RtuResult<T> {
    handle
        .await
        .map_err(|e| RtuError::internal(format!("Task failed: {}", e)))?
}
