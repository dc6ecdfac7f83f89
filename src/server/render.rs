//! Prometheus text exposition for the collected results
//!
//! Metric names follow the original dashboard conventions under the `emqx`
//! namespace. Rendering is plain text formatting; anything fancier belongs
//! to the monitoring system consuming the scrape.

use crate::cluster::types::{
    Authentication, Authorization, Broker, ClusterStatus, DataBridge, DataSource, LicenseInfo,
    RuleEngine,
};
use std::fmt::Write;

fn sample(out: &mut String, name: &str, labels: &[(&str, &str)], value: f64) {
    out.push_str(name);
    if !labels.is_empty() {
        out.push('{');
        for (index, (key, value)) in labels.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            let _ = write!(out, "{key}=\"{}\"", escape_label(value));
        }
        out.push('}');
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let _ = writeln!(out, " {}", value as i64);
    } else {
        let _ = writeln!(out, " {value}");
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn render_cluster_status(out: &mut String, status: &ClusterStatus) {
    sample(
        out,
        "emqx_cluster_status",
        &[],
        f64::from(status.status.as_gauge()),
    );
    for (node, uptime) in &status.node_uptime {
        sample(
            out,
            "emqx_cluster_node_uptime",
            &[("node", node)],
            *uptime as f64,
        );
    }
    for (node, max_fds) in &status.node_max_fds {
        sample(
            out,
            "emqx_cluster_node_max_fds",
            &[("node", node)],
            *max_fds as f64,
        );
    }
    for (node, load) in &status.cpu_loads {
        sample(
            out,
            "emqx_cluster_cpu_load",
            &[("node", node), ("load", "load1")],
            load.load1,
        );
        sample(
            out,
            "emqx_cluster_cpu_load",
            &[("node", node), ("load", "load5")],
            load.load5,
        );
        sample(
            out,
            "emqx_cluster_cpu_load",
            &[("node", node), ("load", "load15")],
            load.load15,
        );
    }
}

pub fn render_license(out: &mut String, license: &LicenseInfo) {
    sample(
        out,
        "emqx_license_max_client_limit",
        &[],
        license.max_client_limit as f64,
    );
    sample(
        out,
        "emqx_license_expiration_time",
        &[],
        license.expiration as f64,
    );
    sample(
        out,
        "emqx_license_remaining_days",
        &[],
        license.remaining_days,
    );
}

pub fn render_broker(out: &mut String, broker: &Broker) {
    sample(
        out,
        "emqx_messages_input_period_second",
        &[],
        broker.msg_input_period_sec as f64,
    );
    sample(
        out,
        "emqx_messages_output_period_second",
        &[],
        broker.msg_output_period_sec as f64,
    );
}

pub fn render_bridges(out: &mut String, bridges: &[DataBridge]) {
    for bridge in bridges {
        let labels = [
            ("name", bridge.name.as_str()),
            ("type", bridge.bridge_type.as_str()),
        ];
        sample(
            out,
            "emqx_rule_bridge_status",
            &labels,
            f64::from(bridge.status.as_gauge()),
        );
        sample(out, "emqx_rule_bridge_queuing", &labels, bridge.queuing as f64);
        sample(
            out,
            "emqx_rule_bridge_last5m_rate",
            &labels,
            bridge.rate_last5m,
        );
        sample(out, "emqx_rule_bridge_max_rate", &labels, bridge.rate_max);
        sample(out, "emqx_rule_bridge_failed", &labels, bridge.failed as f64);
        sample(
            out,
            "emqx_rule_bridge_dropped",
            &labels,
            bridge.dropped as f64,
        );
    }
}

pub fn render_rules(out: &mut String, rules: &[RuleEngine]) {
    for rule in rules {
        let labels = [("node", rule.node_name.as_str()), ("rule", rule.rule_id.as_str())];
        sample(
            out,
            "emqx_rule_topic_hit_count",
            &labels,
            rule.topic_hit_count as f64,
        );
        sample(
            out,
            "emqx_rule_exec_pass_count",
            &labels,
            rule.exec_pass_count as f64,
        );
        sample(
            out,
            "emqx_rule_exec_failure_count",
            &labels,
            rule.exec_failure_count as f64,
        );
        sample(
            out,
            "emqx_rule_exec_no_result_count",
            &labels,
            rule.no_result_count as f64,
        );
        sample(out, "emqx_rule_exec_rate", &labels, rule.exec_rate);
        sample(
            out,
            "emqx_rule_exec_last5m_rate",
            &labels,
            rule.exec_last5m_rate,
        );
        sample(out, "emqx_rule_exec_max_rate", &labels, rule.exec_max_rate);
        sample(out, "emqx_rule_action_total", &labels, rule.action_total as f64);
        sample(
            out,
            "emqx_rule_action_success",
            &labels,
            rule.action_success as f64,
        );
        sample(
            out,
            "emqx_rule_action_failed",
            &labels,
            rule.action_failed as f64,
        );
    }
}

pub fn render_authentication(
    out: &mut String,
    sources: &[DataSource],
    metrics: &[Authentication],
) {
    for source in sources {
        sample(
            out,
            "emqx_authentication_resource_status",
            &[("type", source.res_type.as_str())],
            f64::from(source.status.as_gauge()),
        );
    }
    for metric in metrics {
        let labels = [
            ("node", metric.node_name.as_str()),
            ("type", metric.res_type.as_str()),
        ];
        sample(out, "emqx_authentication_total", &labels, metric.total as f64);
        sample(
            out,
            "emqx_authentication_allow_count",
            &labels,
            metric.allow_count as f64,
        );
        sample(
            out,
            "emqx_authentication_deny_count",
            &labels,
            metric.deny_count as f64,
        );
        sample(out, "emqx_authentication_exec_rate", &labels, metric.exec_rate);
        sample(
            out,
            "emqx_authentication_exec_last5m_rate",
            &labels,
            metric.exec_last5m_rate,
        );
        sample(
            out,
            "emqx_authentication_exec_max_rate",
            &labels,
            metric.exec_max_rate,
        );
    }
}

pub fn render_authorization(out: &mut String, sources: &[DataSource], metrics: &[Authorization]) {
    for source in sources {
        sample(
            out,
            "emqx_authorization_resource_status",
            &[("type", source.res_type.as_str())],
            f64::from(source.status.as_gauge()),
        );
    }
    for metric in metrics {
        let labels = [
            ("node", metric.node_name.as_str()),
            ("type", metric.res_type.as_str()),
        ];
        sample(out, "emqx_authorization_total", &labels, metric.total as f64);
        sample(
            out,
            "emqx_authorization_allow_count",
            &labels,
            metric.allow_count as f64,
        );
        sample(
            out,
            "emqx_authorization_deny_count",
            &labels,
            metric.deny_count as f64,
        );
        sample(out, "emqx_authorization_exec_rate", &labels, metric.exec_rate);
        sample(
            out,
            "emqx_authorization_exec_last5m_rate",
            &labels,
            metric.exec_last5m_rate,
        );
        sample(
            out,
            "emqx_authorization_exec_max_rate",
            &labels,
            metric.exec_max_rate,
        );
    }
}

pub fn render_probe_result(out: &mut String, target: &str, success: bool, elapsed_secs: f64) {
    sample(
        out,
        "emqx_mqtt_probe_success",
        &[("target", target)],
        if success { 1.0 } else { 0.0 },
    );
    sample(
        out,
        "emqx_mqtt_probe_duration_seconds",
        &[("target", target)],
        elapsed_secs,
    );
}
