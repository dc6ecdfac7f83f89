//! Exporter configuration loaded from a YAML file
//!
//! Two independent sections: `metrics` points the cluster gateway at one
//! EMQX management API, `probes` lists the MQTT endpoints to actively probe.
//! Validation fills in the documented defaults so the rest of the code never
//! has to re-check optional fields.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Management-API scrape settings; omit to disable cluster metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
    /// MQTT probe definitions; may be empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeConfig>,
}

/// Settings for the management-API side (cluster gateway).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    /// Address of an EMQX node's management API, e.g. `127.0.0.1:18083`.
    #[serde(default)]
    pub target: String,
    /// API key for HTTP basic auth.
    #[serde(default)]
    pub api_key: String,
    /// API secret for HTTP basic auth.
    #[serde(default)]
    pub api_secret: String,
    /// `http` or `https`; defaults to `http` (`https` when TLS is set).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scheme: String,
    #[serde(default, rename = "tls_config", skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

/// One MQTT probe target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// Address of the EMQX listener to probe, e.g. `127.0.0.1:1883`. Required.
    #[serde(default)]
    pub target: String,
    /// One of `mqtt | tcp | mqtts | ssl | tls`. Defaults to `tcp`
    /// (`ssl` when TLS is set).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scheme: String,
    /// MQTT client id. Defaults to `emqx-exporter-probe-<index>`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Topic used for the publish/subscribe round trip.
    /// Defaults to `emqx-exporter-probe/<index>`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    /// QoS for subscribe and publish. Defaults to 0.
    #[serde(default)]
    pub qos: u8,
    /// Keep-alive in seconds; also bounds every wait inside one probe.
    /// Defaults to 30.
    #[serde(default)]
    pub keep_alive: u64,
    #[serde(default, rename = "tls_config", skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

/// TLS material for either side. Inline PEM data wins over file paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsConfig {
    /// Skip server certificate verification. For testing only.
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cert_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_file: String,
    /// PEM-encoded CA bundle; takes precedence over `ca_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_data: Option<String>,
    /// PEM-encoded client certificate; takes precedence over `cert_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_data: Option<String>,
    /// PEM-encoded client key; takes precedence over `key_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_data: Option<String>,
}

impl TlsConfig {
    /// Resolve the CA bundle, reading `ca_file` when no inline data is set.
    pub fn ca_pem(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        data_or_file(&self.ca_data, &self.ca_file)
    }

    /// Resolve the client certificate PEM.
    pub fn cert_pem(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        data_or_file(&self.cert_data, &self.cert_file)
    }

    /// Resolve the client key PEM.
    pub fn key_pem(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        data_or_file(&self.key_data, &self.key_file)
    }
}

fn data_or_file(data: &Option<String>, file: &str) -> Result<Option<Vec<u8>>, ConfigError> {
    if let Some(data) = data {
        if !data.is_empty() {
            return Ok(Some(data.clone().into_bytes()));
        }
    }
    if !file.is_empty() {
        let bytes = std::fs::read(file)
            .map_err(|e| ConfigError::Invalid(format!("can't read tls file {file}: {e}")))?;
        return Ok(Some(bytes));
    }
    Ok(None)
}

const PROBE_SCHEMES: &[&str] = &["mqtt", "tcp", "mqtts", "ssl", "tls"];

impl Config {
    /// Load a configuration file and apply validation + defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate required fields and fill in defaults in place.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if let Some(metrics) = self.metrics.as_mut() {
            if metrics.api_key.is_empty() {
                return Err(ConfigError::Invalid("metrics.api_key is required".into()));
            }
            if metrics.api_secret.is_empty() {
                return Err(ConfigError::Invalid("metrics.api_secret is required".into()));
            }
            if metrics.target.is_empty() {
                return Err(ConfigError::Invalid("metrics.target is required".into()));
            }
            if metrics.scheme.is_empty() {
                metrics.scheme = if metrics.tls.is_some() { "https" } else { "http" }.to_string();
            }
            if metrics.scheme != "http" && metrics.scheme != "https" {
                return Err(ConfigError::Invalid(format!(
                    "metrics.scheme must be http or https, got {}",
                    metrics.scheme
                )));
            }
        }

        for (index, probe) in self.probes.iter_mut().enumerate() {
            if probe.target.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "probes[{index}].target is required"
                )));
            }
            if probe.scheme.is_empty() {
                probe.scheme = if probe.tls.is_some() { "ssl" } else { "tcp" }.to_string();
            }
            if !PROBE_SCHEMES.contains(&probe.scheme.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "probes[{index}].scheme must be one of {PROBE_SCHEMES:?}, got {}",
                    probe.scheme
                )));
            }
            if probe.qos > 2 {
                return Err(ConfigError::Invalid(format!(
                    "probes[{index}].qos must be 0, 1 or 2"
                )));
            }
            if probe.client_id.is_empty() {
                probe.client_id = format!("emqx-exporter-probe-{index}");
            }
            if probe.topic.is_empty() {
                probe.topic = format!("emqx-exporter-probe/{index}");
            }
            if probe.keep_alive == 0 {
                probe.keep_alive = 30;
            }
        }

        Ok(())
    }

    /// Find the probe definition for a `/probe?target=` request.
    pub fn find_probe(&self, target: &str) -> Option<&ProbeConfig> {
        self.probes.iter().find(|p| p.target == target)
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid tls material: {0}")]
    Tls(String),
}
