//! Probe connection registry and lifecycle
//!
//! One registry entry per distinct probe target. Entries are created
//! lazily on the first probe, reused while the underlying connection is
//! healthy and recycled as soon as it isn't. Targets are fully
//! independent: a broken connection for one never affects another.
//!
//! Connection creation is double-checked and first-wins: the registry
//! lock only ever guards the cheap slot lookup, while a per-target slot
//! mutex serializes establishment and the round trip itself. Two
//! concurrent probes for the same new target therefore produce one
//! connection, with the second caller reusing it.

use super::connection::MqttProbe;
use crate::config::ProbeConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type Slot = Arc<Mutex<Option<Arc<MqttProbe>>>>;
type SlotMap = Arc<RwLock<HashMap<String, Slot>>>;

/// Owns every live probe connection, keyed by target address.
pub struct ProbeManager {
    slots: SlotMap,
    sweep_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProbeManager {
    pub fn new() -> Self {
        Self::with_sweep_interval(SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            sweep_interval,
            shutdown_tx,
            sweep_handle: Mutex::new(None),
        }
    }

    /// Spawn the background sweep that evicts stale registry entries.
    pub async fn start(&self) {
        let slots = self.slots.clone();
        let interval = self.sweep_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("starting probe registry sweep loop");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = sleep(interval) => {
                        Self::sweep(&slots).await;
                    }
                }
            }
            info!("probe registry sweep loop stopped");
        });

        *self.sweep_handle.lock().await = Some(handle);
    }

    /// Stop the sweep loop and wait for it to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.sweep_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Run one publish/expect-echo probe against `probe.target`.
    ///
    /// Reuses the target's live connection when there is one, establishes a
    /// fresh one otherwise. Every failure collapses to `false`; the cause
    /// is logged, never propagated.
    pub async fn probe(&self, probe: &ProbeConfig) -> bool {
        let slot = self.slot(&probe.target).await;
        let mut guard = slot.lock().await;

        let connection = match guard.as_ref() {
            Some(connection) if connection.is_connected() => connection.clone(),
            _ => {
                // Drop any dead handle before reconnecting
                *guard = None;
                match MqttProbe::establish(probe).await {
                    Ok(connection) => {
                        info!(target = %probe.target, topic = %probe.topic, "established probe connection");
                        let connection = Arc::new(connection);
                        *guard = Some(connection.clone());
                        connection
                    }
                    Err(err) => {
                        warn!(target = %probe.target, error = %err, "probe connection failed");
                        return false;
                    }
                }
            }
        };

        match connection.round_trip(probe).await {
            Ok(()) => true,
            Err(err) => {
                warn!(target = %probe.target, error = %err, "probe round trip failed");
                false
            }
        }
    }

    /// Number of registered targets. Mostly for tests and logs.
    pub async fn registered_targets(&self) -> usize {
        self.slots.read().await.len()
    }

    async fn slot(&self, target: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(target) {
            return slot.clone();
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Evict entries whose connection has gone stale. A slot that is
    /// locked right now is in active use and left alone.
    async fn sweep(slots: &SlotMap) {
        let mut slots = slots.write().await;
        slots.retain(|target, slot| match slot.try_lock() {
            Ok(guard) => match guard.as_ref() {
                Some(connection) if connection.is_connected() => true,
                Some(_) => {
                    debug!(target = %target, "evicting stale probe connection");
                    false
                }
                None => false,
            },
            Err(_) => true,
        });
    }
}

impl Default for ProbeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_probe() -> ProbeConfig {
        // Port 1 on loopback refuses connections immediately
        ProbeConfig {
            target: "127.0.0.1:1".to_string(),
            scheme: "tcp".to_string(),
            client_id: "emqx-exporter-probe-0".to_string(),
            topic: "emqx-exporter-probe/0".to_string(),
            qos: 0,
            keep_alive: 1,
            ..ProbeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_probe_against_unreachable_target_fails() {
        let manager = ProbeManager::new();
        assert!(!manager.probe(&unreachable_probe()).await);
    }

    #[tokio::test]
    async fn test_failed_connection_is_not_registered_as_live() {
        let manager = ProbeManager::new();
        manager.probe(&unreachable_probe()).await;

        // The slot exists but holds no connection, so the sweep clears it
        assert_eq!(manager.registered_targets().await, 1);
        ProbeManager::sweep(&manager.slots).await;
        assert_eq!(manager.registered_targets().await, 0);
    }

    #[tokio::test]
    async fn test_slots_are_deduplicated_per_target() {
        let manager = ProbeManager::new();
        let a = manager.slot("127.0.0.1:1883").await;
        let b = manager.slot("127.0.0.1:1883").await;
        assert!(Arc::ptr_eq(&a, &b));

        let other = manager.slot("127.0.0.1:8883").await;
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(manager.registered_targets().await, 2);
    }

    #[tokio::test]
    async fn test_sweep_keeps_slots_in_active_use() {
        let manager = ProbeManager::new();
        let slot = manager.slot("127.0.0.1:1883").await;

        let guard = slot.lock().await;
        ProbeManager::sweep(&manager.slots).await;
        assert_eq!(manager.registered_targets().await, 1);
        drop(guard);

        ProbeManager::sweep(&manager.slots).await;
        assert_eq!(manager.registered_targets().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_loop_shutdown() {
        let manager = ProbeManager::with_sweep_interval(Duration::from_millis(10));
        manager.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.shutdown().await;
    }
}
