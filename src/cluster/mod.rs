//! Version-adaptive management-API client
//!
//! EMQX exposes two incompatible API generations on the same endpoint. This
//! module keeps both clients behind one capability trait and a gateway that
//! discovers which generation the configured target currently speaks:
//!
//! - [`requester`] - authenticated GET with envelope validation
//! - [`types`] - wire-agnostic result structs
//! - [`node`] - pure node-name and uptime parsing helpers
//! - [`api_v4`] / [`api_v5`] - per-generation wire schemas
//! - [`gateway`] - adapter ownership, discovery loop, read path

pub mod api_v4;
pub mod api_v5;
pub mod gateway;
pub mod node;
pub mod requester;
pub mod types;

pub use api_v4::ApiV4;
pub use api_v5::ApiV5;
pub use gateway::ClusterGateway;
pub use requester::Requester;
pub use types::{
    Authentication, Authorization, Broker, ClusterStatus, CpuLoad, DataBridge, DataSource,
    Edition, LicenseInfo, LoadValue, NodeHealth, RuleEngine,
};

use crate::error::RequestError;
use async_trait::async_trait;

/// Capability surface shared by both API generations.
///
/// Callers never learn which generation is installed; the gateway swaps
/// implementations behind its lock. Operations don't retry internally, and
/// every error names the remote call that failed.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Human-readable broker version, e.g. `4.4.19` or `5.8.0-enterprise`.
    /// Populated as a side effect of [`ClusterApi::cluster_status`].
    fn version(&self) -> String;

    /// Discovered broker edition; [`Edition::Unknown`] until a
    /// cluster-status call has seen it (4.x never reports one).
    fn edition(&self) -> Edition;

    /// Node inventory and overall health. Success of this call is what
    /// validates an adapter during discovery.
    async fn cluster_status(&self) -> Result<ClusterStatus, RequestError>;

    /// License details; `None` (not an error) for open-source brokers or
    /// when the endpoint is absent.
    async fn license(&self) -> Result<Option<LicenseInfo>, RequestError>;

    /// Current input/output message rates; `None` when the endpoint is
    /// absent on this edition.
    async fn broker_metrics(&self) -> Result<Option<Broker>, RequestError>;

    /// Configured data bridges with status and throughput.
    async fn data_bridges(&self) -> Result<Vec<DataBridge>, RequestError>;

    /// Per-node metrics for enabled rules only.
    async fn rule_engine_metrics(&self) -> Result<Vec<RuleEngine>, RequestError>;

    /// Enabled authentication sources: resource statuses plus per-node
    /// counters. Empty on 4.x (the API generation has no such endpoint).
    async fn authentication_metrics(
        &self,
    ) -> Result<(Vec<DataSource>, Vec<Authentication>), RequestError>;

    /// Enabled authorization sources; same shape and caveats as
    /// [`ClusterApi::authentication_metrics`].
    async fn authorization_metrics(
        &self,
    ) -> Result<(Vec<DataSource>, Vec<Authorization>), RequestError>;
}
