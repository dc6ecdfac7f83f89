//! Client for the 5.x management API
//!
//! 5.x returns bare JSON documents (no `{code, data}` envelope on success),
//! reports uptime in milliseconds and carries an `edition` field on every
//! node. Rule and authn/authz metrics need a follow-up call per resource;
//! a failure on any follow-up aborts the whole operation so a scrape never
//! reports a partial view as complete.

use super::node::cut_node_name;
use super::requester::Requester;
use super::types::{
    Authentication, Authorization, Broker, ClusterStatus, CpuLoad, DataBridge, DataSource,
    Edition, LicenseInfo, LoadValue, NodeHealth, RuleEngine,
};
use super::ClusterApi;
use crate::error::RequestError;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::sync::{Arc, RwLock};

const RUNNING_TOKEN: &str = "running";

#[derive(Debug, Clone, Default)]
struct Discovered {
    version: String,
    edition: Edition,
}

/// 5.x adapter. Edition and version are remembered from the last
/// cluster-status call; the license query is skipped entirely for
/// open-source brokers.
pub struct ApiV5 {
    requester: Arc<Requester>,
    discovered: RwLock<Discovered>,
}

impl ApiV5 {
    pub fn new(requester: Arc<Requester>) -> Self {
        Self {
            requester,
            discovered: RwLock::new(Discovered::default()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeV5 {
    #[serde(default)]
    version: String,
    /// Uptime in milliseconds.
    #[serde(default)]
    uptime: i64,
    #[serde(default)]
    node_status: String,
    #[serde(default)]
    node: String,
    #[serde(default)]
    max_fds: i64,
    #[serde(default)]
    edition: String,
    #[serde(default)]
    load1: LoadValue,
    #[serde(default)]
    load5: LoadValue,
    #[serde(default)]
    load15: LoadValue,
}

#[derive(Debug, Deserialize)]
struct LicenseV5 {
    #[serde(default)]
    max_connections: i64,
    #[serde(default)]
    expiry_at: String,
}

#[derive(Debug, Deserialize)]
struct MonitorV5 {
    #[serde(default)]
    sent_msg_rate: i64,
    #[serde(default)]
    received_msg_rate: i64,
}

#[derive(Debug, Deserialize)]
struct RulesV5 {
    #[serde(default)]
    data: Vec<RuleV5>,
}

#[derive(Debug, Deserialize)]
struct RuleV5 {
    #[serde(default)]
    id: String,
    #[serde(default)]
    enable: bool,
}

#[derive(Debug, Deserialize)]
struct RuleMetricsV5 {
    #[serde(default)]
    node_metrics: Vec<RuleNodeMetricsV5>,
}

#[derive(Debug, Deserialize)]
struct RuleNodeMetricsV5 {
    #[serde(default)]
    node: String,
    #[serde(default)]
    metrics: RuleCountersV5,
}

#[derive(Debug, Default, Deserialize)]
struct RuleCountersV5 {
    #[serde(default, rename = "matched.rate")]
    rate: f64,
    #[serde(default, rename = "matched.rate.last5m")]
    rate_last5m: f64,
    #[serde(default, rename = "matched.rate.max")]
    rate_max: f64,
    #[serde(default)]
    matched: i64,
    #[serde(default)]
    passed: i64,
    #[serde(default)]
    failed: i64,
    #[serde(default, rename = "failed.no_result")]
    no_result: i64,
    #[serde(default, rename = "actions.total")]
    action_total: i64,
    #[serde(default, rename = "actions.success")]
    action_success: i64,
    #[serde(default, rename = "actions.failed")]
    action_failed: i64,
}

#[derive(Debug, Deserialize)]
struct BridgeV5 {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    bridge_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    metrics: BridgeMetricsV5,
}

#[derive(Debug, Default, Deserialize)]
struct BridgeMetricsV5 {
    #[serde(default)]
    queuing: i64,
    #[serde(default)]
    rate_last5m: f64,
    #[serde(default)]
    rate_max: f64,
    #[serde(default)]
    failed: i64,
    #[serde(default)]
    dropped: i64,
}

#[derive(Debug, Deserialize)]
struct AuthenticatorV5 {
    #[serde(default)]
    id: String,
    #[serde(default)]
    backend: String,
    #[serde(default)]
    enable: bool,
}

#[derive(Debug, Deserialize)]
struct AuthSourcesV5 {
    #[serde(default)]
    sources: Vec<AuthSourceV5>,
}

#[derive(Debug, Deserialize)]
struct AuthSourceV5 {
    #[serde(default, rename = "type")]
    source_type: String,
    #[serde(default)]
    enable: bool,
}

#[derive(Debug, Deserialize)]
struct AuthStatusV5 {
    #[serde(default)]
    node_metrics: Vec<AuthNodeMetricsV5>,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct AuthNodeMetricsV5 {
    #[serde(default)]
    node: String,
    #[serde(default)]
    metrics: AuthCountersV5,
}

/// Counters shared by authn (`success`/`failed`) and authz
/// (`allow`/`deny`); whichever pair is absent stays zero.
#[derive(Debug, Default, Deserialize)]
struct AuthCountersV5 {
    #[serde(default)]
    total: i64,
    #[serde(default)]
    success: i64,
    #[serde(default)]
    failed: i64,
    #[serde(default)]
    allow: i64,
    #[serde(default)]
    deny: i64,
    #[serde(default)]
    rate: f64,
    #[serde(default)]
    rate_last5m: f64,
    #[serde(default)]
    rate_max: f64,
}

#[async_trait]
impl ClusterApi for ApiV5 {
    fn version(&self) -> String {
        let discovered = match self.discovered.read() {
            Ok(discovered) => discovered.clone(),
            Err(_) => return String::new(),
        };
        if discovered.version.is_empty() {
            return String::new();
        }
        format!("{}-{}", discovered.version, discovered.edition)
    }

    fn edition(&self) -> Edition {
        self.discovered
            .read()
            .map(|d| d.edition)
            .unwrap_or_default()
    }

    async fn cluster_status(&self) -> Result<ClusterStatus, RequestError> {
        let nodes: Vec<NodeV5> = self.requester.get_into("/api/v5/nodes").await?;

        let mut cluster = ClusterStatus {
            status: NodeHealth::Healthy,
            ..ClusterStatus::default()
        };
        if nodes.is_empty() {
            cluster.status = NodeHealth::Unhealthy;
        }

        for node in nodes {
            if node.node_status != RUNNING_TOKEN {
                cluster.status = NodeHealth::Unhealthy;
            }
            let node_name = cut_node_name(&node.node);
            cluster
                .node_uptime
                .insert(node_name.clone(), node.uptime / 1000);
            cluster.node_max_fds.insert(node_name.clone(), node.max_fds);
            cluster.cpu_loads.insert(
                node_name,
                CpuLoad {
                    load1: node.load1.as_f64(),
                    load5: node.load5.as_f64(),
                    load15: node.load15.as_f64(),
                },
            );

            if let Ok(mut discovered) = self.discovered.write() {
                discovered.edition = if node.edition == "Opensource" {
                    Edition::OpenSource
                } else {
                    Edition::Enterprise
                };
                discovered.version = node.version;
            }
        }
        Ok(cluster)
    }

    async fn license(&self) -> Result<Option<LicenseInfo>, RequestError> {
        if self.edition() == Edition::OpenSource {
            return Ok(None);
        }

        let license: LicenseV5 = match self.requester.get_into("/api/v5/license").await {
            Ok(license) => license,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let expiry = NaiveDate::parse_from_str(&license.expiry_at, "%Y-%m-%d").map_err(|_| {
            RequestError::Payload {
                uri: "/api/v5/license".to_string(),
                message: format!("can't parse expiry time {:?}", license.expiry_at),
            }
        })?;

        Ok(Some(LicenseInfo {
            max_client_limit: license.max_connections,
            expiration: expiry
                .and_time(NaiveTime::MIN)
                .and_utc()
                .timestamp_millis(),
            remaining_days: 0.0,
        }))
    }

    async fn broker_metrics(&self) -> Result<Option<Broker>, RequestError> {
        let monitor: MonitorV5 = match self.requester.get_into("/api/v5/monitor_current").await {
            Ok(monitor) => monitor,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        Ok(Some(Broker {
            msg_input_period_sec: monitor.received_msg_rate,
            msg_output_period_sec: monitor.sent_msg_rate,
        }))
    }

    async fn data_bridges(&self) -> Result<Vec<DataBridge>, RequestError> {
        let bridges: Vec<BridgeV5> = self.requester.get_into("/api/v5/bridges").await?;

        Ok(bridges
            .into_iter()
            .map(|bridge| DataBridge {
                name: bridge.name,
                bridge_type: bridge.bridge_type,
                status: if bridge.status == "connected" {
                    NodeHealth::Healthy
                } else {
                    NodeHealth::Unhealthy
                },
                queuing: bridge.metrics.queuing,
                rate_last5m: bridge.metrics.rate_last5m,
                rate_max: bridge.metrics.rate_max,
                failed: bridge.metrics.failed,
                dropped: bridge.metrics.dropped,
            })
            .collect())
    }

    async fn rule_engine_metrics(&self) -> Result<Vec<RuleEngine>, RequestError> {
        let rules: RulesV5 = self.requester.get_into("/api/v5/rules?limit=10000").await?;

        let mut metrics = Vec::new();
        for rule in rules.data {
            if !rule.enable {
                continue;
            }

            let rule_metrics: RuleMetricsV5 = self
                .requester
                .get_into(&format!("/api/v5/rules/{}/metrics", rule.id))
                .await?;

            for node in rule_metrics.node_metrics {
                metrics.push(RuleEngine {
                    node_name: cut_node_name(&node.node),
                    rule_id: rule.id.clone(),
                    topic_hit_count: node.metrics.matched,
                    exec_pass_count: node.metrics.passed,
                    exec_failure_count: node.metrics.failed,
                    no_result_count: node.metrics.no_result,
                    exec_rate: node.metrics.rate,
                    exec_last5m_rate: node.metrics.rate_last5m,
                    exec_max_rate: node.metrics.rate_max,
                    action_total: node.metrics.action_total,
                    action_success: node.metrics.action_success,
                    action_failed: node.metrics.action_failed,
                });
            }
        }
        Ok(metrics)
    }

    async fn authentication_metrics(
        &self,
    ) -> Result<(Vec<DataSource>, Vec<Authentication>), RequestError> {
        let authenticators: Vec<AuthenticatorV5> =
            self.requester.get_into("/api/v5/authentication").await?;

        let mut data_sources = Vec::new();
        let mut metrics = Vec::new();
        for authenticator in authenticators {
            if !authenticator.enable {
                continue;
            }

            let status: AuthStatusV5 = self
                .requester
                .get_into(&format!(
                    "/api/v5/authentication/{}/status",
                    authenticator.id
                ))
                .await?;

            data_sources.push(DataSource {
                res_type: authenticator.backend.clone(),
                status: connected_health(&status.status),
            });

            for node in status.node_metrics {
                metrics.push(Authentication {
                    node_name: cut_node_name(&node.node),
                    res_type: authenticator.backend.clone(),
                    total: node.metrics.total,
                    allow_count: node.metrics.success,
                    deny_count: node.metrics.failed,
                    exec_rate: node.metrics.rate,
                    exec_last5m_rate: node.metrics.rate_last5m,
                    exec_max_rate: node.metrics.rate_max,
                });
            }
        }
        Ok((data_sources, metrics))
    }

    async fn authorization_metrics(
        &self,
    ) -> Result<(Vec<DataSource>, Vec<Authorization>), RequestError> {
        let sources: AuthSourcesV5 = self
            .requester
            .get_into("/api/v5/authorization/sources")
            .await?;

        let mut data_sources = Vec::new();
        let mut metrics = Vec::new();
        for source in sources.sources {
            if !source.enable {
                continue;
            }

            let status: AuthStatusV5 = self
                .requester
                .get_into(&format!(
                    "/api/v5/authorization/sources/{}/status",
                    source.source_type
                ))
                .await?;

            data_sources.push(DataSource {
                res_type: source.source_type.clone(),
                status: connected_health(&status.status),
            });

            for node in status.node_metrics {
                metrics.push(Authorization {
                    node_name: cut_node_name(&node.node),
                    res_type: source.source_type.clone(),
                    total: node.metrics.total,
                    allow_count: node.metrics.allow,
                    deny_count: node.metrics.deny,
                    exec_rate: node.metrics.rate,
                    exec_last5m_rate: node.metrics.rate_last5m,
                    exec_max_rate: node.metrics.rate_max,
                });
            }
        }
        Ok((data_sources, metrics))
    }
}

fn connected_health(status: &str) -> NodeHealth {
    if status == "connected" {
        NodeHealth::Healthy
    } else {
        NodeHealth::Unhealthy
    }
}
