//! Cluster gateway: adapter ownership, discovery and the read path
//!
//! The gateway owns the single active [`ClusterApi`] behind a read-mostly
//! lock. A background loop re-discovers the API generation every few
//! seconds with freshly constructed adapters (4.x first, then 5.x), so a
//! broker upgrade or restart is picked up without restarting the exporter.
//! Readers snapshot whatever adapter is currently bound; while nothing is
//! bound they get zero-value results with Unknown status instead of errors
//! or blocking.

use super::api_v4::ApiV4;
use super::api_v5::ApiV5;
use super::requester::Requester;
use super::types::{
    Authentication, Authorization, Broker, ClusterStatus, DataBridge, DataSource, LicenseInfo,
    RuleEngine,
};
use super::ClusterApi;
use crate::config::{ConfigError, MetricsConfig};
use crate::error::CollectError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

const DISCOVERY_INTERVAL: Duration = Duration::from_secs(5);

type BoundClient = Arc<RwLock<Option<Arc<dyn ClusterApi>>>>;

/// Owns the active management-API client and serves every metric read.
pub struct ClusterGateway {
    requester: Arc<Requester>,
    client: BoundClient,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    discovery_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterGateway {
    /// Build a gateway for the configured target. No discovery happens
    /// until [`ClusterGateway::start`] is called.
    pub fn new(config: &MetricsConfig) -> Result<Self, ConfigError> {
        Self::with_interval(config, DISCOVERY_INTERVAL)
    }

    /// Same as [`ClusterGateway::new`] with a custom discovery period.
    pub fn with_interval(
        config: &MetricsConfig,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            requester: Arc::new(Requester::new(config)?),
            client: Arc::new(RwLock::new(None)),
            interval,
            shutdown_tx,
            discovery_handle: Mutex::new(None),
        })
    }

    /// Spawn the periodic discovery loop.
    pub async fn start(&self) {
        let requester = self.requester.clone();
        let slot = self.client.clone();
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("starting cluster discovery loop");
            loop {
                Self::discover_once(&requester, &slot).await;

                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = sleep(interval) => {}
                }
            }
            info!("cluster discovery loop stopped");
        });

        *self.discovery_handle.lock().await = Some(handle);
    }

    /// Stop the discovery loop and wait for it to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.discovery_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// One discovery cycle: validate a fresh 4.x adapter, fall back to a
    /// fresh 5.x one, and atomically install the winner. Both failing
    /// unbinds the gateway; the causes are logged, never propagated.
    async fn discover_once(requester: &Arc<Requester>, slot: &BoundClient) {
        let candidate: Option<Arc<dyn ClusterApi>> = {
            let v4 = ApiV4::new(requester.clone());
            match v4.cluster_status().await {
                Ok(_) => Some(Arc::new(v4)),
                Err(v4_err) => {
                    debug!(error = %v4_err, "4.x api probe failed");
                    let v5 = ApiV5::new(requester.clone());
                    match v5.cluster_status().await {
                        Ok(_) => Some(Arc::new(v5)),
                        Err(v5_err) => {
                            error!(
                                v4_error = %v4_err,
                                v5_error = %v5_err,
                                "no cluster node answered either api generation, will retry"
                            );
                            None
                        }
                    }
                }
            }
        };

        let mut bound = slot.write().await;
        match candidate {
            Some(next) => {
                let previous = bound.as_ref().map(|client| client.version());
                let version = next.version();
                if previous.as_deref() != Some(version.as_str()) {
                    info!(?previous, %version, "bound cluster client");
                }
                *bound = Some(next);
            }
            None => {
                if bound.take().is_some() {
                    info!("unbound cluster client");
                }
            }
        }
    }

    /// Snapshot the currently bound adapter under the read lock.
    async fn bound_client(&self) -> Option<Arc<dyn ClusterApi>> {
        self.client.read().await.clone()
    }

    /// Version string of the bound adapter, if any. Mostly for logs/tests.
    pub async fn bound_version(&self) -> Option<String> {
        self.bound_client().await.map(|client| client.version())
    }

    /// Overall cluster health plus per-node figures. Unbound gateways
    /// report [`super::NodeHealth::Unknown`] with empty node maps.
    pub async fn cluster_status(&self) -> Result<ClusterStatus, CollectError> {
        let Some(client) = self.bound_client().await else {
            return Ok(ClusterStatus::default());
        };
        client
            .cluster_status()
            .await
            .map_err(|e| CollectError::new("cluster status", e))
    }

    /// License info with `remaining_days` derived from "now" on every call,
    /// rounded to one decimal place.
    pub async fn license(&self) -> Result<Option<LicenseInfo>, CollectError> {
        let Some(client) = self.bound_client().await else {
            return Ok(None);
        };
        let mut license = client
            .license()
            .await
            .map_err(|e| CollectError::new("license", e))?;

        if let Some(license) = license.as_mut() {
            let millis_left = license.expiration - Utc::now().timestamp_millis();
            let days = millis_left as f64 / 86_400_000.0;
            license.remaining_days = (days * 10.0).round() / 10.0;
        }
        Ok(license)
    }

    /// Broker-wide message rates; `None` when unbound or unsupported.
    pub async fn broker_metrics(&self) -> Result<Option<Broker>, CollectError> {
        let Some(client) = self.bound_client().await else {
            return Ok(None);
        };
        client
            .broker_metrics()
            .await
            .map_err(|e| CollectError::new("broker metrics", e))
    }

    /// Data bridges and per-node rule metrics, collected together the way
    /// the dashboard consumes them.
    pub async fn rule_engine_metrics(
        &self,
    ) -> Result<(Vec<DataBridge>, Vec<RuleEngine>), CollectError> {
        let Some(client) = self.bound_client().await else {
            return Ok((Vec::new(), Vec::new()));
        };
        let bridges = client
            .data_bridges()
            .await
            .map_err(|e| CollectError::new("rule engine data bridge", e))?;
        let rules = client
            .rule_engine_metrics()
            .await
            .map_err(|e| CollectError::new("rule engine metrics", e))?;
        Ok((bridges, rules))
    }

    /// Enabled authentication sources and their per-node counters.
    pub async fn authentication_metrics(
        &self,
    ) -> Result<(Vec<DataSource>, Vec<Authentication>), CollectError> {
        let Some(client) = self.bound_client().await else {
            return Ok((Vec::new(), Vec::new()));
        };
        client
            .authentication_metrics()
            .await
            .map_err(|e| CollectError::new("authentication metrics", e))
    }

    /// Enabled authorization sources and their per-node counters.
    pub async fn authorization_metrics(
        &self,
    ) -> Result<(Vec<DataSource>, Vec<Authorization>), CollectError> {
        let Some(client) = self.bound_client().await else {
            return Ok((Vec::new(), Vec::new()));
        };
        client
            .authorization_metrics()
            .await
            .map_err(|e| CollectError::new("authorization metrics", e))
    }
}
