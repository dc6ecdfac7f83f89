//! EMQX Exporter - Main Entry Point

use clap::Parser;
use emqx_exporter::cluster::ClusterGateway;
use emqx_exporter::config::Config;
use emqx_exporter::logging::init_default_logging;
use emqx_exporter::probe::ProbeManager;
use emqx_exporter::server::ExporterServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

/// Prometheus exporter for EMQX clusters with active MQTT probing
#[derive(Parser)]
#[command(name = "emqx-exporter")]
#[command(about = "Prometheus exporter for EMQX clusters")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(long = "config.file", value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Address for the exporter's HTTP server
    #[arg(long = "web.listen-address", value_name = "ADDR", default_value = "0.0.0.0:8085")]
    listen_address: SocketAddr,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();
    info!("starting emqx-exporter v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load_from_file(&cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "failed to load configuration");
            process::exit(1);
        }
    };
    info!(path = %cli.config.display(), probes = config.probes.len(), "loaded config file");

    let gateway = match &config.metrics {
        Some(metrics) => match ClusterGateway::new(metrics) {
            Ok(gateway) => {
                let gateway = Arc::new(gateway);
                gateway.start().await;
                Some(gateway)
            }
            Err(e) => {
                error!(error = %e, "failed to create cluster gateway");
                process::exit(1);
            }
        },
        None => {
            info!("no metrics configured, skipping cluster metrics");
            None
        }
    };

    let probe_manager = Arc::new(ProbeManager::new());
    probe_manager.start().await;

    let server = Arc::new(ExporterServer::new(
        gateway.clone(),
        probe_manager.clone(),
        config.clone(),
    ));
    let server_handle = tokio::spawn(server.start(cli.listen_address));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");

    server_handle.abort();
    if let Some(gateway) = &gateway {
        gateway.shutdown().await;
    }
    probe_manager.shutdown().await;

    info!("exporter shutdown complete");
}
