//! Simulation driver
//!
//! A fixed-tick background task that animates the slave's register store:
//! while coil 0 is set, a counter increments into holding register 0 at
//! most once per elapsed second. Clearing coil 0 freezes the counter;
//! setting it again resumes from the frozen value.
//!
//! The once-per-second rule lives in [`SimulationDriver::tick_at`], which
//! takes the current instant as an argument so tests can drive it with a
//! synthetic clock instead of sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::broadcast;

use crate::error::RtuResult;
use crate::store::RegisterStore;

/// Coil that gates the counter
const RUN_COIL: u16 = 0;
/// Holding register the counter is published to
const COUNTER_REGISTER: u16 = 0;

/// Counter task over a shared register store
pub struct SimulationDriver {
    store: Arc<RegisterStore>,
    tick_interval: Duration,
    counter: u16,
    last_increment: Option<Instant>,
}

impl SimulationDriver {
    /// Create a driver with the default tick interval
    pub fn new(store: Arc<RegisterStore>) -> Self {
        Self::with_interval(store, Duration::from_millis(crate::DEFAULT_SIM_TICK_MS))
    }

    /// Create a driver with an explicit tick interval
    pub fn with_interval(store: Arc<RegisterStore>, tick_interval: Duration) -> Self {
        Self {
            store,
            tick_interval,
            counter: 0,
            last_increment: None,
        }
    }

    /// Current counter value
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Apply one tick of the increment rule at the given instant
    ///
    /// Returns `true` when the counter advanced. The counter advances only
    /// while coil 0 is set, and at most once per elapsed second; ticks can
    /// run much faster than that without changing the rate.
    pub fn tick_at(&mut self, now: Instant) -> RtuResult<bool> {
        if !self.store.get_coil(RUN_COIL)? {
            return Ok(false);
        }

        let due = match self.last_increment {
            Some(last) => now.duration_since(last) >= Duration::from_secs(1),
            None => true,
        };
        if !due {
            return Ok(false);
        }

        self.counter = self.counter.wrapping_add(1);
        self.store.set_holding(COUNTER_REGISTER, self.counter)?;
        self.last_increment = Some(now);

        debug!("Simulation counter advanced to {}", self.counter);
        Ok(true)
    }

    /// Drive the tick loop until the stop channel fires
    pub async fn run(mut self, mut stop: broadcast::Receiver<()>) -> RtuResult<()> {
        info!(
            "Simulation driver started (tick every {:?})",
            self.tick_interval
        );

        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = stop.recv() => {
                    info!("Simulation driver stopping (counter={})", self.counter);
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.tick_at(Instant::now())?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> (SimulationDriver, Arc<RegisterStore>) {
        let store = Arc::new(RegisterStore::default());
        (SimulationDriver::new(Arc::clone(&store)), store)
    }

    #[test]
    fn test_frozen_while_coil_clear() {
        let (mut sim, store) = driver();
        let t0 = Instant::now();

        for i in 0..10 {
            assert!(!sim.tick_at(t0 + Duration::from_secs(i)).unwrap());
        }
        assert_eq!(store.get_holding(0).unwrap(), 0);
        assert_eq!(sim.counter(), 0);
    }

    #[test]
    fn test_first_tick_increments_immediately() {
        let (mut sim, store) = driver();
        store.set_coil(0, true).unwrap();

        assert!(sim.tick_at(Instant::now()).unwrap());
        assert_eq!(store.get_holding(0).unwrap(), 1);
    }

    #[test]
    fn test_at_most_once_per_second() {
        let (mut sim, store) = driver();
        store.set_coil(0, true).unwrap();
        let t0 = Instant::now();

        assert!(sim.tick_at(t0).unwrap());
        assert!(!sim.tick_at(t0 + Duration::from_millis(150)).unwrap());
        assert!(!sim.tick_at(t0 + Duration::from_millis(999)).unwrap());
        assert!(sim.tick_at(t0 + Duration::from_millis(1000)).unwrap());
        assert!(!sim.tick_at(t0 + Duration::from_millis(1500)).unwrap());

        assert_eq!(store.get_holding(0).unwrap(), 2);
    }

    #[test]
    fn test_resumes_from_frozen_value() {
        let (mut sim, store) = driver();
        store.set_coil(0, true).unwrap();
        let t0 = Instant::now();

        assert!(sim.tick_at(t0).unwrap());
        store.set_coil(0, false).unwrap();
        assert!(!sim.tick_at(t0 + Duration::from_secs(5)).unwrap());
        assert_eq!(store.get_holding(0).unwrap(), 1);

        store.set_coil(0, true).unwrap();
        assert!(sim.tick_at(t0 + Duration::from_secs(6)).unwrap());
        assert_eq!(store.get_holding(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stop_signal_terminates_loop() {
        let store = Arc::new(RegisterStore::default());
        let sim = SimulationDriver::with_interval(Arc::clone(&store), Duration::from_millis(5));
        let (stop_tx, stop_rx) = broadcast::channel(1);

        let handle = tokio::spawn(sim.run(stop_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "simulation loop must stop on signal");
    }
}
