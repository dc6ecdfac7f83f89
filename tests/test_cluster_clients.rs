//! Versioned management-API client tests against a mock HTTP server
//!
//! Exercises the wire schemas of both API generations plus the shared
//! requester behavior: envelope validation, 404-as-absent-capability and
//! the abort-on-partial-failure rule for two-level fan-outs.

use emqx_exporter::cluster::types::{Edition, NodeHealth};
use emqx_exporter::cluster::{ApiV4, ApiV5, ClusterApi, Requester};
use emqx_exporter::config::MetricsConfig;
use emqx_exporter::error::RequestError;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn metrics_config(server: &MockServer) -> MetricsConfig {
    MetricsConfig {
        target: server.address().to_string(),
        api_key: "key".to_string(),
        api_secret: "secret".to_string(),
        scheme: "http".to_string(),
        tls: None,
    }
}

fn requester(server: &MockServer) -> Arc<Requester> {
    Arc::new(Requester::new(&metrics_config(server)).unwrap())
}

async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn v4_nodes_body(status_a: &str, status_b: &str) -> serde_json::Value {
    json!({
        "code": 0,
        "data": [
            {
                "version": "4.4.19",
                "uptime": "2 days, 3 hours, 4 minutes, 5 seconds",
                "node_status": status_a,
                "node": "emqx@10.0.0.5",
                "max_fds": 1048576,
                "load1": "2.5",
                "load5": "1.2",
                "load15": "0.7"
            },
            {
                "version": "4.4.19",
                "uptime": "41 minutes, 47 seconds",
                "node_status": status_b,
                "node": "emqx@broker.example.com",
                "max_fds": 1048576,
                "load1": "0.1",
                "load5": "0.1",
                "load15": "0.1"
            }
        ]
    })
}

#[tokio::test]
async fn test_v4_cluster_status_parses_nodes() {
    let server = MockServer::start().await;
    mount_json(&server, "/api/v4/nodes", v4_nodes_body("Running", "Running")).await;

    let client = ApiV4::new(requester(&server));
    let status = client.cluster_status().await.unwrap();

    assert_eq!(status.status, NodeHealth::Healthy);
    assert_eq!(
        status.node_uptime.get("10.0.0.5"),
        Some(&(2 * 86400 + 3 * 3600 + 4 * 60 + 5))
    );
    assert_eq!(status.node_uptime.get("broker"), Some(&(41 * 60 + 47)));
    let load = status.cpu_loads.get("10.0.0.5").unwrap();
    assert!((load.load1 - 2.5).abs() < f64::EPSILON);
    assert_eq!(client.version(), "4.4.19");
}

#[tokio::test]
async fn test_v4_cluster_status_parse_is_idempotent() {
    let server = MockServer::start().await;
    mount_json(&server, "/api/v4/nodes", v4_nodes_body("Running", "Running")).await;

    let client = ApiV4::new(requester(&server));
    let first = client.cluster_status().await.unwrap();
    let second = client.cluster_status().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_v4_single_stopped_node_makes_cluster_unhealthy() {
    let server = MockServer::start().await;
    mount_json(&server, "/api/v4/nodes", v4_nodes_body("Running", "Stopped")).await;

    let client = ApiV4::new(requester(&server));
    let status = client.cluster_status().await.unwrap();
    assert_eq!(status.status, NodeHealth::Unhealthy);
}

#[tokio::test]
async fn test_v4_unrecognized_node_status_counts_as_unhealthy() {
    let server = MockServer::start().await;
    mount_json(&server, "/api/v4/nodes", v4_nodes_body("Running", "")).await;

    let client = ApiV4::new(requester(&server));
    let status = client.cluster_status().await.unwrap();
    assert_eq!(status.status, NodeHealth::Unhealthy);
}

#[tokio::test]
async fn test_v4_license_absent_endpoint_is_no_data_not_error() {
    let server = MockServer::start().await;
    // No license mock mounted: the server answers 404

    let client = ApiV4::new(requester(&server));
    assert!(client.license().await.unwrap().is_none());
}

#[tokio::test]
async fn test_v4_license_parses_expiry() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/v4/license",
        json!({
            "code": 0,
            "data": {"max_connections": 100000, "expiry_at": "2030-01-01 00:00:00"}
        }),
    )
    .await;

    let client = ApiV4::new(requester(&server));
    let license = client.license().await.unwrap().unwrap();
    assert_eq!(license.max_client_limit, 100000);
    assert!(license.expiration > 0);
}

#[tokio::test]
async fn test_v4_embedded_error_code_is_an_api_error() {
    let server = MockServer::start().await;
    mount_json(&server, "/api/v4/nodes", json!({"code": 102})).await;

    let client = ApiV4::new(requester(&server));
    let err = client.cluster_status().await.unwrap_err();
    assert!(matches!(err, RequestError::Api { code, .. } if code == "102"));
}

#[tokio::test]
async fn test_v4_disabled_rules_are_filtered_out() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/v4/rules",
        json!({
            "code": 0,
            "data": [
                {
                    "id": "rule:enabled",
                    "enabled": true,
                    "metrics": [
                        {"node": "emqx@10.0.0.5", "speed": 1.0, "speed_max": 2.0,
                         "speed_last5m": 0.5, "matched": 10, "passed": 9, "failed": 1}
                    ],
                    "actions": [
                        {"metrics": [{"node": "emqx@10.0.0.5", "taken": 9, "success": 8, "failed": 1}]}
                    ]
                },
                {"id": "rule:disabled", "enabled": false, "metrics": [], "actions": []}
            ]
        }),
    )
    .await;

    let client = ApiV4::new(requester(&server));
    let rules = client.rule_engine_metrics().await.unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].rule_id, "rule:enabled");
    assert_eq!(rules[0].node_name, "10.0.0.5");
    assert_eq!(rules[0].action_total, 9);
    assert_eq!(rules[0].action_success, 8);
}

#[tokio::test]
async fn test_v4_enabling_a_rule_makes_it_appear_on_the_next_call() {
    let server = MockServer::start().await;
    let rule = |enabled: bool| {
        json!({
            "code": 0,
            "data": [{
                "id": "rule:toggled",
                "enabled": enabled,
                "metrics": [
                    {"node": "emqx@10.0.0.5", "speed": 1.0, "speed_max": 2.0,
                     "speed_last5m": 0.5, "matched": 10, "passed": 9, "failed": 1}
                ],
                "actions": []
            }]
        })
    };
    mount_json(&server, "/api/v4/rules", rule(false)).await;

    let client = ApiV4::new(requester(&server));
    assert!(client.rule_engine_metrics().await.unwrap().is_empty());

    server.reset().await;
    mount_json(&server, "/api/v4/rules", rule(true)).await;

    let rules = client.rule_engine_metrics().await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].rule_id, "rule:toggled");
}

#[tokio::test]
async fn test_v4_auth_metrics_are_always_empty() {
    let server = MockServer::start().await;
    let client = ApiV4::new(requester(&server));

    let (sources, auths) = client.authentication_metrics().await.unwrap();
    assert!(sources.is_empty());
    assert!(auths.is_empty());

    let (sources, auths) = client.authorization_metrics().await.unwrap();
    assert!(sources.is_empty());
    assert!(auths.is_empty());
}

fn v5_nodes_body(edition: &str, status: &str) -> serde_json::Value {
    json!([
        {
            "version": "5.8.0",
            "uptime": 90000,
            "node_status": status,
            "node": "emqx@10.0.0.5",
            "max_fds": 1048576,
            "edition": edition,
            "load1": 0.5,
            "load5": "0.25",
            "load15": 0.1
        }
    ])
}

#[tokio::test]
async fn test_v5_cluster_status_parses_nodes() {
    let server = MockServer::start().await;
    mount_json(&server, "/api/v5/nodes", v5_nodes_body("Enterprise", "running")).await;

    let client = ApiV5::new(requester(&server));
    let status = client.cluster_status().await.unwrap();

    assert_eq!(status.status, NodeHealth::Healthy);
    assert_eq!(status.node_uptime.get("10.0.0.5"), Some(&90));
    let load = status.cpu_loads.get("10.0.0.5").unwrap();
    assert!((load.load5 - 0.25).abs() < f64::EPSILON);

    assert_eq!(client.edition(), Edition::Enterprise);
    assert_eq!(client.version(), "5.8.0-enterprise");
}

#[tokio::test]
async fn test_v5_non_running_status_is_unhealthy() {
    let server = MockServer::start().await;
    // 4.x capitalizes its token; for 5.x "Running" is the wrong one
    mount_json(&server, "/api/v5/nodes", v5_nodes_body("Enterprise", "Running")).await;

    let client = ApiV5::new(requester(&server));
    let status = client.cluster_status().await.unwrap();
    assert_eq!(status.status, NodeHealth::Unhealthy);
}

#[tokio::test]
async fn test_v5_open_source_license_is_skipped_entirely() {
    let server = MockServer::start().await;
    mount_json(&server, "/api/v5/nodes", v5_nodes_body("Opensource", "running")).await;

    let client = ApiV5::new(requester(&server));
    client.cluster_status().await.unwrap();
    assert_eq!(client.edition(), Edition::OpenSource);

    // No /api/v5/license mock mounted: a request would come back 404, but
    // the edition gate means no request is made at all.
    assert!(client.license().await.unwrap().is_none());
    assert_eq!(
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/v5/license")
            .count(),
        0
    );
}

#[tokio::test]
async fn test_v5_broker_metrics() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/v5/monitor_current",
        json!({"sent_msg_rate": 7, "received_msg_rate": 11}),
    )
    .await;

    let client = ApiV5::new(requester(&server));
    let broker = client.broker_metrics().await.unwrap().unwrap();
    assert_eq!(broker.msg_input_period_sec, 11);
    assert_eq!(broker.msg_output_period_sec, 7);
}

#[tokio::test]
async fn test_v5_broker_metrics_absent_endpoint_is_no_data() {
    let server = MockServer::start().await;
    let client = ApiV5::new(requester(&server));
    assert!(client.broker_metrics().await.unwrap().is_none());
}

#[tokio::test]
async fn test_v5_rule_metrics_follow_up_per_enabled_rule() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/v5/rules",
        json!({
            "data": [
                {"id": "rule-a", "enable": true},
                {"id": "rule-b", "enable": false}
            ]
        }),
    )
    .await;
    mount_json(
        &server,
        "/api/v5/rules/rule-a/metrics",
        json!({
            "node_metrics": [{
                "node": "emqx@10.0.0.5",
                "metrics": {
                    "matched.rate": 1.5, "matched.rate.last5m": 1.0, "matched.rate.max": 9.0,
                    "matched": 100, "passed": 98, "failed": 2, "failed.no_result": 1,
                    "actions.total": 98, "actions.success": 97, "actions.failed": 1
                }
            }]
        }),
    )
    .await;

    let client = ApiV5::new(requester(&server));
    let rules = client.rule_engine_metrics().await.unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].rule_id, "rule-a");
    assert_eq!(rules[0].topic_hit_count, 100);
    assert_eq!(rules[0].no_result_count, 1);
}

#[tokio::test]
async fn test_v5_bridges_keep_status_but_report_disconnected() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/v5/bridges",
        json!([
            {"name": "kafka-out", "type": "kafka", "status": "connected",
             "metrics": {"queuing": 3, "rate_last5m": 0.5, "rate_max": 2.0, "failed": 0, "dropped": 0}},
            {"name": "pg-out", "type": "pgsql", "status": "disconnected",
             "metrics": {"queuing": 0, "rate_last5m": 0.0, "rate_max": 0.0, "failed": 4, "dropped": 1}}
        ]),
    )
    .await;

    let client = ApiV5::new(requester(&server));
    let bridges = client.data_bridges().await.unwrap();

    assert_eq!(bridges.len(), 2);
    assert_eq!(bridges[0].status, NodeHealth::Healthy);
    assert_eq!(bridges[1].status, NodeHealth::Unhealthy);
    assert_eq!(bridges[1].failed, 4);
}

#[tokio::test]
async fn test_v5_authentication_fan_out() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/v5/authentication",
        json!([
            {"id": "password_based:built_in_database", "backend": "built_in_database", "enable": true},
            {"id": "jwt", "backend": "jwt", "enable": false}
        ]),
    )
    .await;
    mount_json(
        &server,
        "/api/v5/authentication/password_based:built_in_database/status",
        json!({
            "status": "connected",
            "node_metrics": [{
                "node": "emqx@10.0.0.5",
                "metrics": {"total": 50, "success": 48, "failed": 2,
                            "rate": 0.2, "rate_last5m": 0.1, "rate_max": 1.0}
            }]
        }),
    )
    .await;

    let client = ApiV5::new(requester(&server));
    let (sources, auths) = client.authentication_metrics().await.unwrap();

    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].res_type, "built_in_database");
    assert_eq!(sources[0].status, NodeHealth::Healthy);

    assert_eq!(auths.len(), 1);
    assert_eq!(auths[0].allow_count, 48);
    assert_eq!(auths[0].deny_count, 2);
}

#[tokio::test]
async fn test_v5_authentication_partial_failure_aborts_whole_operation() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/v5/authentication",
        json!([
            {"id": "password_based:built_in_database", "backend": "built_in_database", "enable": true}
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v5/authentication/password_based:built_in_database/status",
        ))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = ApiV5::new(requester(&server));
    let err = client.authentication_metrics().await.unwrap_err();
    assert!(matches!(err, RequestError::Status { .. }));
}

#[tokio::test]
async fn test_v5_authorization_fan_out() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/v5/authorization/sources",
        json!({
            "sources": [
                {"type": "file", "enable": true},
                {"type": "http", "enable": false}
            ]
        }),
    )
    .await;
    mount_json(
        &server,
        "/api/v5/authorization/sources/file/status",
        json!({
            "status": "connected",
            "node_metrics": [{
                "node": "emqx@10.0.0.5",
                "metrics": {"total": 30, "allow": 29, "deny": 1,
                            "rate": 0.3, "rate_last5m": 0.2, "rate_max": 2.0}
            }]
        }),
    )
    .await;

    let client = ApiV5::new(requester(&server));
    let (sources, auths) = client.authorization_metrics().await.unwrap();

    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].res_type, "file");
    assert_eq!(auths.len(), 1);
    assert_eq!(auths[0].allow_count, 29);
    assert_eq!(auths[0].deny_count, 1);
}
