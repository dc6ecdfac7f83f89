//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error
//! handling. We test observable outcomes, not YAML parsing internals.

use emqx_exporter::config::{Config, ConfigError};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_config_loads_successfully_from_valid_yaml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
metrics:
  target: 127.0.0.1:18083
  api_key: some-key
  api_secret: some-secret
probes:
  - target: 127.0.0.1:1883
  - target: broker.example.com:8883
    scheme: ssl
    client_id: custom-probe
    topic: custom/topic
    qos: 1
    keep_alive: 10
"#
    )
    .unwrap();

    let config = Config::load_from_file(temp_file.path()).unwrap();

    let metrics = config.metrics.as_ref().unwrap();
    assert_eq!(metrics.target, "127.0.0.1:18083");
    assert_eq!(metrics.api_key, "some-key");
    assert_eq!(metrics.scheme, "http");

    assert_eq!(config.probes.len(), 2);
    assert_eq!(config.probes[0].client_id, "emqx-exporter-probe-0");
    assert_eq!(config.probes[0].topic, "emqx-exporter-probe/0");
    assert_eq!(config.probes[0].keep_alive, 30);
    assert_eq!(config.probes[1].client_id, "custom-probe");
    assert_eq!(config.probes[1].topic, "custom/topic");
    assert_eq!(config.probes[1].qos, 1);
}

#[test]
fn test_config_without_metrics_section_is_valid() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
probes:
  - target: 127.0.0.1:1883
"#
    )
    .unwrap();

    let config = Config::load_from_file(temp_file.path()).unwrap();
    assert!(config.metrics.is_none());
    assert_eq!(config.probes.len(), 1);
}

#[test]
fn test_config_rejects_metrics_without_credentials() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
metrics:
  target: 127.0.0.1:18083
  api_key: some-key
  api_secret: ""
"#
    )
    .unwrap();

    let result = Config::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_config_rejects_invalid_yaml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "metrics: [not: a: mapping").unwrap();

    let result = Config::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::YamlParse(_))));
}

#[test]
fn test_config_rejects_missing_file() {
    let result = Config::load_from_file("/nonexistent/config.yaml");
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_tls_presence_switches_default_schemes() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
metrics:
  target: 127.0.0.1:18083
  api_key: some-key
  api_secret: some-secret
  tls_config:
    insecure_skip_verify: true
probes:
  - target: 127.0.0.1:8883
    tls_config:
      insecure_skip_verify: true
"#
    )
    .unwrap();

    let config = Config::load_from_file(temp_file.path()).unwrap();
    assert_eq!(config.metrics.as_ref().unwrap().scheme, "https");
    assert_eq!(config.probes[0].scheme, "ssl");
}
