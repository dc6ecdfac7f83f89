//! Client for the 4.x management API
//!
//! 4.x wraps every payload in a `{code, data}` envelope, phrases uptime as
//! English ("2 days, 19 hours, ..."), reports load averages as strings and
//! nests rule action metrics per action. It has no authentication/
//! authorization metrics endpoints at all; those operations are genuinely
//! empty here, not unimplemented.

use super::node::{cut_node_name, parse_human_uptime};
use super::requester::Requester;
use super::types::{
    Authentication, Authorization, Broker, ClusterStatus, CpuLoad, DataBridge, DataSource,
    Edition, LicenseInfo, LoadValue, NodeHealth, RuleEngine,
};
use super::ClusterApi;
use crate::error::RequestError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::sync::{Arc, RwLock};

const RUNNING_TOKEN: &str = "Running";

/// 4.x adapter. Immutable except for the version string discovered from
/// cluster status.
pub struct ApiV4 {
    requester: Arc<Requester>,
    version: RwLock<String>,
}

impl ApiV4 {
    pub fn new(requester: Arc<Requester>) -> Self {
        Self {
            requester,
            version: RwLock::new(String::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct NodeV4 {
    #[serde(default)]
    version: String,
    #[serde(default)]
    uptime: String,
    #[serde(default)]
    node_status: String,
    #[serde(default)]
    node: String,
    #[serde(default)]
    max_fds: i64,
    #[serde(default)]
    load1: LoadValue,
    #[serde(default)]
    load5: LoadValue,
    #[serde(default)]
    load15: LoadValue,
}

#[derive(Debug, Deserialize)]
struct LicenseV4 {
    #[serde(default)]
    max_connections: i64,
    #[serde(default)]
    expiry_at: String,
}

#[derive(Debug, Deserialize)]
struct MonitorV4 {
    #[serde(default)]
    sent: i64,
    #[serde(default)]
    received: i64,
}

#[derive(Debug, Deserialize)]
struct RuleV4 {
    #[serde(default)]
    id: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    metrics: Vec<RuleMetricV4>,
    #[serde(default)]
    actions: Vec<ActionV4>,
}

#[derive(Debug, Deserialize)]
struct RuleMetricV4 {
    #[serde(default)]
    node: String,
    #[serde(default)]
    speed_max: f64,
    #[serde(default)]
    speed_last5m: f64,
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    matched: i64,
    #[serde(default)]
    passed: i64,
    #[serde(default)]
    failed: i64,
}

#[derive(Debug, Deserialize)]
struct ActionV4 {
    #[serde(default)]
    metrics: Vec<ActionMetricV4>,
}

#[derive(Debug, Deserialize)]
struct ActionMetricV4 {
    #[serde(default)]
    node: String,
    #[serde(default)]
    taken: i64,
    #[serde(default)]
    success: i64,
    #[serde(default)]
    failed: i64,
}

#[derive(Debug, Deserialize)]
struct ResourceV4 {
    #[serde(default)]
    id: String,
    #[serde(default, rename = "type")]
    resource_type: String,
    #[serde(default)]
    status: bool,
}

#[async_trait]
impl ClusterApi for ApiV4 {
    fn version(&self) -> String {
        self.version.read().map(|v| v.clone()).unwrap_or_default()
    }

    fn edition(&self) -> Edition {
        // 4.x nodes don't report an edition; license availability is probed
        // per call instead.
        Edition::Unknown
    }

    async fn cluster_status(&self) -> Result<ClusterStatus, RequestError> {
        let resp: Envelope<Vec<NodeV4>> = self.requester.get_into("/api/v4/nodes").await?;
        let nodes = resp.data.unwrap_or_default();

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
                .insert(node_name.clone(), parse_human_uptime(&node.uptime));
            cluster.node_max_fds.insert(node_name.clone(), node.max_fds);
            cluster.cpu_loads.insert(
                node_name,
                CpuLoad {
                    load1: node.load1.as_f64(),
                    load5: node.load5.as_f64(),
                    load15: node.load15.as_f64(),
                },
            );

            if let Ok(mut version) = self.version.write() {
                *version = node.version;
            }
        }
        Ok(cluster)
    }

    async fn license(&self) -> Result<Option<LicenseInfo>, RequestError> {
        let resp: Envelope<LicenseV4> = match self.requester.get_into("/api/v4/license").await {
            Ok(resp) => resp,
            // open source builds don't expose the license api
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let Some(license) = resp.data else {
            return Ok(None);
        };

        let expiry = NaiveDateTime::parse_from_str(&license.expiry_at, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| RequestError::Payload {
                uri: "/api/v4/license".to_string(),
                message: format!("can't parse expiry time {:?}", license.expiry_at),
            })?;

        Ok(Some(LicenseInfo {
            max_client_limit: license.max_connections,
            expiration: expiry.and_utc().timestamp_millis(),
            remaining_days: 0.0,
        }))
    }

    async fn broker_metrics(&self) -> Result<Option<Broker>, RequestError> {
        let resp: Envelope<MonitorV4> = match self
            .requester
            .get_into("/api/v4/monitor/current_metrics")
            .await
        {
            Ok(resp) => resp,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let Some(monitor) = resp.data else {
            return Ok(None);
        };

        Ok(Some(Broker {
            msg_input_period_sec: monitor.received,
            msg_output_period_sec: monitor.sent,
        }))
    }

    async fn data_bridges(&self) -> Result<Vec<DataBridge>, RequestError> {
        let resp: Envelope<Vec<ResourceV4>> =
            self.requester.get_into("/api/v4/resources").await?;

        let bridges = resp
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|resource| DataBridge {
                name: resource.id,
                bridge_type: resource.resource_type,
                status: if resource.status {
                    NodeHealth::Healthy
                } else {
                    NodeHealth::Unhealthy
                },
                ..DataBridge::default()
            })
            .collect();
        Ok(bridges)
    }

    async fn rule_engine_metrics(&self) -> Result<Vec<RuleEngine>, RequestError> {
        let resp: Envelope<Vec<RuleV4>> = self
            .requester
            .get_into("/api/v4/rules?_limit=10000")
            .await?;

        let mut metrics = Vec::new();
        for rule in resp.data.unwrap_or_default() {
            if !rule.enabled {
                continue;
            }

            for rule_metric in &rule.metrics {
                let mut engine = RuleEngine {
                    node_name: cut_node_name(&rule_metric.node),
                    rule_id: rule.id.clone(),
                    topic_hit_count: rule_metric.matched,
                    exec_pass_count: rule_metric.passed,
                    exec_failure_count: rule_metric.failed,
                    exec_rate: rule_metric.speed,
                    exec_last5m_rate: rule_metric.speed_last5m,
                    exec_max_rate: rule_metric.speed_max,
                    ..RuleEngine::default()
                };
                // action metrics arrive per action; correlate by node name
                fill_action_metrics(&rule.actions, &rule_metric.node, &mut engine);
                metrics.push(engine);
            }
        }
        Ok(metrics)
    }

    async fn authentication_metrics(
        &self,
    ) -> Result<(Vec<DataSource>, Vec<Authentication>), RequestError> {
        // 4.x has no authentication metrics api
        Ok((Vec::new(), Vec::new()))
    }

    async fn authorization_metrics(
        &self,
    ) -> Result<(Vec<DataSource>, Vec<Authorization>), RequestError> {
        // 4.x has no authorization metrics api
        Ok((Vec::new(), Vec::new()))
    }
}

fn fill_action_metrics(actions: &[ActionV4], node: &str, engine: &mut RuleEngine) {
    for action in actions {
        if let Some(metric) = action.metrics.iter().find(|m| m.node == node) {
            engine.action_total = metric.taken;
            engine.action_success = metric.success;
            engine.action_failed = metric.failed;
            return;
        }
    }
}
