//! Typed results produced by the versioned management-API clients
//!
//! These are the structs the metric-emission layer consumes. They are wire
//! agnostic: both API generations decode into the same shapes.

use serde::Deserialize;
use std::collections::HashMap;

/// Health of a cluster, node or bridge resource as exposed to metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeHealth {
    #[default]
    Unknown,
    Unhealthy,
    Healthy,
}

impl NodeHealth {
    /// Numeric gauge value: 0 unknown, 1 unhealthy, 2 healthy.
    pub fn as_gauge(self) -> u8 {
        match self {
            NodeHealth::Unknown => 0,
            NodeHealth::Unhealthy => 1,
            NodeHealth::Healthy => 2,
        }
    }
}

/// Broker build edition, discovered from the cluster-status response.
///
/// Open-source builds have no license endpoint, so the edition gates license
/// collection entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Edition {
    #[default]
    Unknown,
    OpenSource,
    Enterprise,
}

impl std::fmt::Display for Edition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edition::Unknown => write!(f, "unknown"),
            Edition::OpenSource => write!(f, "opensource"),
            Edition::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// A CPU load figure that arrives as either a JSON number or a numeric
/// string, depending on broker generation and runtime state.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LoadValue {
    Numeric(f64),
    Textual(String),
}

impl LoadValue {
    /// Resolve to a float; unparseable text resolves to 0.
    pub fn as_f64(&self) -> f64 {
        match self {
            LoadValue::Numeric(value) => *value,
            LoadValue::Textual(text) => text.trim().parse().unwrap_or(0.0),
        }
    }
}

impl Default for LoadValue {
    fn default() -> Self {
        LoadValue::Numeric(0.0)
    }
}

/// 1/5/15-minute load averages for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuLoad {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// Aggregate cluster state, keyed by canonicalized node name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterStatus {
    pub status: NodeHealth,
    /// Per-node uptime in seconds.
    pub node_uptime: HashMap<String, i64>,
    /// Per-node file-descriptor limit.
    pub node_max_fds: HashMap<String, i64>,
    pub cpu_loads: HashMap<String, CpuLoad>,
}

/// License details for enterprise clusters.
///
/// `remaining_days` is always derived from "now" at read time by the
/// gateway, never stored by an adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LicenseInfo {
    pub max_client_limit: i64,
    /// Expiration instant in unix milliseconds.
    pub expiration: i64,
    pub remaining_days: f64,
}

/// Current broker-wide message rates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Broker {
    pub msg_input_period_sec: i64,
    pub msg_output_period_sec: i64,
}

/// Per-node metrics for one enabled rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleEngine {
    pub node_name: String,
    pub rule_id: String,
    pub topic_hit_count: i64,
    pub exec_pass_count: i64,
    pub exec_failure_count: i64,
    pub no_result_count: i64,
    pub exec_rate: f64,
    pub exec_last5m_rate: f64,
    pub exec_max_rate: f64,
    pub action_total: i64,
    pub action_success: i64,
    pub action_failed: i64,
}

/// One configured data bridge (external connector) and its throughput.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBridge {
    pub name: String,
    pub bridge_type: String,
    pub status: NodeHealth,
    pub queuing: i64,
    pub rate_last5m: f64,
    pub rate_max: f64,
    pub failed: i64,
    pub dropped: i64,
}

/// Backing resource status for one authn/authz source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSource {
    pub res_type: String,
    pub status: NodeHealth,
}

/// Per-node counters for one enabled authentication source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Authentication {
    pub node_name: String,
    pub res_type: String,
    pub total: i64,
    pub allow_count: i64,
    pub deny_count: i64,
    pub exec_rate: f64,
    pub exec_last5m_rate: f64,
    pub exec_max_rate: f64,
}

/// Per-node counters for one enabled authorization source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Authorization {
    pub node_name: String,
    pub res_type: String,
    pub total: i64,
    pub allow_count: i64,
    pub deny_count: i64,
    pub exec_rate: f64,
    pub exec_last5m_rate: f64,
    pub exec_max_rate: f64,
}
