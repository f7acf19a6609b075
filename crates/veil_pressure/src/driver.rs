//! Background auto-tick driver.
//!
//! The coordinator itself is oblivious to how it is invoked; this wraps
//! a shared coordinator in a timer loop that calls `tick_all` with the
//! real elapsed time and publishes the resulting pressure map on a watch
//! channel for subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};

use crate::coordinator::PressureCoordinator;

/// Configuration for the auto-tick loop.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How often to advance the simulation (default: 500ms).
    pub interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
        }
    }
}

impl DriverConfig {
    /// Fast ticking for latency-sensitive setups.
    pub fn fast() -> Self {
        Self {
            interval: Duration::from_millis(100),
        }
    }

    /// Very fast ticking for tests.
    pub fn testing() -> Self {
        Self {
            interval: Duration::from_millis(10),
        }
    }
}

/// Handle to a running auto-tick task.
pub struct PressureDriver {
    coordinator: Arc<RwLock<PressureCoordinator>>,
    shutdown_tx: watch::Sender<bool>,
    map_rx: watch::Receiver<HashMap<String, f32>>,
}

impl PressureDriver {
    /// Spawn the tick loop on the current tokio runtime.
    pub fn spawn(coordinator: Arc<RwLock<PressureCoordinator>>, config: DriverConfig) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (map_tx, map_rx) = watch::channel(HashMap::new());

        let coord = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            let mut last_tick = Instant::now();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = Instant::now();
                        let dt = now.duration_since(last_tick).as_secs_f64();
                        last_tick = now;
                        if dt <= 0.0 {
                            continue;
                        }

                        let map = {
                            let mut guard = coord.write().await;
                            if let Err(e) = guard.tick_all(dt) {
                                tracing::warn!("Auto-tick failed: {}", e);
                                continue;
                            }
                            guard.pressure_map()
                        };
                        let _ = map_tx.send(map);
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("Pressure driver shutting down");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            coordinator,
            shutdown_tx,
            map_rx,
        }
    }

    /// Shared access to the coordinator (for registration, population
    /// feeds and snapshot reads).
    pub fn coordinator(&self) -> Arc<RwLock<PressureCoordinator>> {
        Arc::clone(&self.coordinator)
    }

    /// Subscribe to per-tick pressure maps.
    pub fn subscribe(&self) -> watch::Receiver<HashMap<String, f32>> {
        self.map_rx.clone()
    }

    /// Stop the background task.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_driver_ticks_registered_region() {
        let mut coord = PressureCoordinator::default();
        coord.add_region("glade", (0.0, 0.0));
        let shared = Arc::new(RwLock::new(coord));

        let driver = PressureDriver::spawn(Arc::clone(&shared), DriverConfig::testing());
        sleep(Duration::from_millis(100)).await;

        let snap = shared.read().await.get_state("glade").unwrap();
        assert!(snap.sim_time > 0.0);
        driver.stop();
    }

    #[tokio::test]
    async fn test_driver_publishes_pressure_map() {
        let mut coord = PressureCoordinator::default();
        coord.add_region("glade", (0.0, 0.0));
        let shared = Arc::new(RwLock::new(coord));

        let driver = PressureDriver::spawn(shared, DriverConfig::testing());
        let mut rx = driver.subscribe();
        rx.changed().await.unwrap();
        let map = rx.borrow().clone();
        assert!(map.contains_key("glade"));
        driver.stop();
    }

    #[tokio::test]
    async fn test_stop_halts_ticking() {
        let mut coord = PressureCoordinator::default();
        coord.add_region("glade", (0.0, 0.0));
        let shared = Arc::new(RwLock::new(coord));

        let driver = PressureDriver::spawn(Arc::clone(&shared), DriverConfig::testing());
        sleep(Duration::from_millis(50)).await;
        driver.stop();
        sleep(Duration::from_millis(50)).await;

        let frozen = shared.read().await.get_state("glade").unwrap().sim_time;
        sleep(Duration::from_millis(50)).await;
        let later = shared.read().await.get_state("glade").unwrap().sim_time;
        assert_eq!(frozen, later);
    }
}
