//! HTTP surface of the exporter
//!
//! Serves `/metrics` (cluster scrape), `/probe?target=` (active MQTT
//! probe), `/config` (loaded configuration as YAML) and a `/` endpoint
//! listing. A scrape never turns collector failures into HTTP errors:
//! a broken collector logs a warning and contributes nothing, an unbound
//! gateway contributes the zero-valued results.

pub mod render;

use crate::cluster::ClusterGateway;
use crate::config::Config;
use crate::probe::ProbeManager;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use warp::http::StatusCode;
use warp::Filter;

/// Shared state behind the warp routes.
pub struct ExporterServer {
    gateway: Option<Arc<ClusterGateway>>,
    probe_manager: Arc<ProbeManager>,
    config: Arc<Config>,
}

impl ExporterServer {
    pub fn new(
        gateway: Option<Arc<ClusterGateway>>,
        probe_manager: Arc<ProbeManager>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            gateway,
            probe_manager,
            config,
        }
    }

    /// Serve the exporter routes until the task is dropped.
    pub async fn start(self: Arc<Self>, addr: SocketAddr) {
        let metrics_server = self.clone();
        let probe_server = self.clone();
        let config_server = self.clone();

        // GET /metrics - cluster metrics scrape
        let metrics_route = warp::path("metrics").and(warp::get()).and_then(move || {
            let server = metrics_server.clone();
            async move {
                let body = server.collect_metrics().await;
                Ok::<_, Infallible>(text_reply(body, StatusCode::OK))
            }
        });

        // GET /probe?target=... - active MQTT probe
        // A bare /probe (no query string at all) still answers 400 below
        let probe_route = warp::path("probe")
            .and(warp::get())
            .and(
                warp::query::<HashMap<String, String>>()
                    .or(warp::any().map(HashMap::new))
                    .unify(),
            )
            .and_then(move |params: HashMap<String, String>| {
                let server = probe_server.clone();
                async move {
                    let target = params.get("target").cloned().unwrap_or_default();
                    match server.run_probe(&target).await {
                        Some(body) => Ok::<_, Infallible>(text_reply(body, StatusCode::OK)),
                        None => Ok::<_, Infallible>(text_reply(
                            format!("Unknown probe target {target:?}\n"),
                            StatusCode::BAD_REQUEST,
                        )),
                    }
                }
            });

        // GET /config - loaded configuration as yaml
        let config_route = warp::path("config").and(warp::get()).and_then(move || {
            let server = config_server.clone();
            async move {
                match serde_yaml::to_string(server.config.as_ref()) {
                    Ok(body) => Ok::<_, Infallible>(text_reply(body, StatusCode::OK)),
                    Err(e) => Ok::<_, Infallible>(text_reply(
                        format!("can't render configuration: {e}\n"),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )),
                }
            }
        });

        // GET / - endpoint listing
        let root_route = warp::path::end().and(warp::get()).and_then(move || async move {
            let mut endpoints = HashMap::new();
            endpoints.insert("/metrics".to_string(), "Cluster metrics".to_string());
            endpoints.insert(
                "/probe".to_string(),
                "Active MQTT probe, takes ?target=".to_string(),
            );
            endpoints.insert("/config".to_string(), "Loaded configuration".to_string());
            Ok::<_, Infallible>(warp::reply::json(&endpoints))
        });

        let routes = metrics_route.or(probe_route).or(config_route).or(root_route);

        tracing::info!(address = %addr, "starting exporter http server");
        warp::serve(routes).run(addr).await;
    }

    /// Run every cluster collector and render what succeeded.
    pub async fn collect_metrics(&self) -> String {
        let mut out = String::new();
        let Some(gateway) = &self.gateway else {
            return out;
        };

        match gateway.cluster_status().await {
            Ok(status) => render::render_cluster_status(&mut out, &status),
            Err(e) => tracing::warn!(error = %e, "scrape skipped a collector"),
        }

        match gateway.license().await {
            Ok(Some(license)) => render::render_license(&mut out, &license),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "scrape skipped a collector"),
        }

        match gateway.broker_metrics().await {
            Ok(Some(broker)) => render::render_broker(&mut out, &broker),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "scrape skipped a collector"),
        }

        match gateway.rule_engine_metrics().await {
            Ok((bridges, rules)) => {
                render::render_bridges(&mut out, &bridges);
                render::render_rules(&mut out, &rules);
            }
            Err(e) => tracing::warn!(error = %e, "scrape skipped a collector"),
        }

        match gateway.authentication_metrics().await {
            Ok((sources, metrics)) => render::render_authentication(&mut out, &sources, &metrics),
            Err(e) => tracing::warn!(error = %e, "scrape skipped a collector"),
        }

        match gateway.authorization_metrics().await {
            Ok((sources, metrics)) => render::render_authorization(&mut out, &sources, &metrics),
            Err(e) => tracing::warn!(error = %e, "scrape skipped a collector"),
        }

        out
    }

    /// Probe one configured target; `None` when the target isn't configured.
    pub async fn run_probe(&self, target: &str) -> Option<String> {
        let probe = self.config.find_probe(target)?.clone();

        let start = Instant::now();
        let success = self.probe_manager.probe(&probe).await;
        let elapsed = start.elapsed().as_secs_f64();

        let mut out = String::new();
        render::render_probe_result(&mut out, target, success, elapsed);
        Some(out)
    }
}

fn text_reply(body: String, status: StatusCode) -> impl warp::Reply {
    warp::reply::with_status(
        warp::reply::with_header(body, "Content-Type", "text/plain; charset=utf-8"),
        status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;

    fn server_without_gateway(probes: Vec<ProbeConfig>) -> ExporterServer {
        let config = Config {
            metrics: None,
            probes,
        };
        ExporterServer::new(None, Arc::new(ProbeManager::new()), Arc::new(config))
    }

    #[tokio::test]
    async fn test_metrics_without_gateway_is_empty_not_an_error() {
        let server = server_without_gateway(Vec::new());
        assert!(server.collect_metrics().await.is_empty());
    }

    #[tokio::test]
    async fn test_probe_unknown_target_is_rejected() {
        let server = server_without_gateway(Vec::new());
        assert!(server.run_probe("10.0.0.1:1883").await.is_none());
    }

    #[tokio::test]
    async fn test_probe_failure_renders_zero_gauge() {
        let probe = ProbeConfig {
            target: "127.0.0.1:1".to_string(),
            scheme: "tcp".to_string(),
            client_id: "emqx-exporter-probe-0".to_string(),
            topic: "emqx-exporter-probe/0".to_string(),
            keep_alive: 1,
            ..ProbeConfig::default()
        };
        let server = server_without_gateway(vec![probe]);

        let body = server.run_probe("127.0.0.1:1").await.unwrap();
        assert!(body.contains("emqx_mqtt_probe_success{target=\"127.0.0.1:1\"} 0\n"));
        assert!(body.contains("emqx_mqtt_probe_duration_seconds"));
    }
}
