//! EMQX Exporter - Rust Implementation
//!
//! Polls an EMQX cluster's management API and its MQTT data plane, and
//! exposes the results as Prometheus metrics and active health probes.
//!
//! # Overview
//!
//! Two subsystems do the real work:
//!
//! - The cluster gateway discovers which management-API generation (4.x or
//!   5.x) the configured target currently speaks, keeps that discovery
//!   current in the background and serves every metric read from whichever
//!   client is bound right now.
//! - The probe manager keeps one live MQTT connection per probe target and
//!   answers `/probe` requests with a publish/expect-echo round trip,
//!   recycling connections as soon as they go stale.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use emqx_exporter::cluster::ClusterGateway;
//! use emqx_exporter::config::Config;
//!
//! # tokio_test::block_on(async {
//! let config = Config::load_from_file("config.yaml")?;
//! if let Some(metrics) = &config.metrics {
//!     let gateway = ClusterGateway::new(metrics)?;
//!     gateway.start().await;
//!
//!     let status = gateway.cluster_status().await?;
//!     println!("cluster health: {:?}", status.status);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod server;

pub use cluster::{ClusterApi, ClusterGateway};
pub use config::{Config, ConfigError, MetricsConfig, ProbeConfig};
pub use error::{CollectError, ProbeError, RequestError};
pub use probe::ProbeManager;
pub use server::ExporterServer;
