//! Authenticated HTTP GET helper for the management API
//!
//! Stateless beyond the base URI and credentials. Every response goes
//! through the same three validations: status must be 200, the body must be
//! JSON, and the embedded EMQX error code must be absent/zero. The embedded
//! code is an integer on 4.x and a string on 5.x, so the check branches on
//! the JSON value type instead of assuming one representation.
//!
//! No retries here; retry policy lives with the discovery loop and the
//! scrape scheduler.

use crate::config::{ConfigError, MetricsConfig, TlsConfig};
use crate::error::RequestError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = "EMQX-Exporter";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP GET helper bound to one management-API base URI.
pub struct Requester {
    client: reqwest::Client,
    base: Url,
    api_key: String,
    api_secret: String,
}

impl Requester {
    /// Build a requester from the metrics section of the configuration.
    pub fn new(config: &MetricsConfig) -> Result<Self, ConfigError> {
        let base = Url::parse(&format!("{}://{}", config.scheme, config.target))
            .map_err(|e| ConfigError::Invalid(format!("metrics.target: {e}")))?;

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .use_rustls_tls();

        if let Some(tls) = &config.tls {
            builder = apply_tls(builder, tls)?;
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::Tls(e.to_string()))?;

        Ok(Self {
            client,
            base,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// GET `path` and return the decoded JSON body after envelope validation.
    pub async fn get(&self, path: &str) -> Result<Value, RequestError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| RequestError::Payload {
                uri: format!("{}{}", self.base, path),
                message: e.to_string(),
            })?;
        let uri = url.to_string();

        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await
            .map_err(|source| RequestError::Transport {
                uri: uri.clone(),
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RequestError::Status { uri, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| RequestError::Transport {
                uri: uri.clone(),
                source,
            })?;

        let value: Value =
            serde_json::from_slice(&body).map_err(|source| RequestError::Decode {
                uri: uri.clone(),
                source,
            })?;

        check_embedded_code(&uri, &value)?;
        Ok(value)
    }

    /// GET `path` and deserialize the validated body into `T`.
    pub async fn get_into<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let value = self.get(path).await?;
        let uri = self
            .base
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| path.to_string());
        serde_json::from_value(value).map_err(|source| RequestError::Decode { uri, source })
    }
}

fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> Result<reqwest::ClientBuilder, ConfigError> {
    if tls.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(ca) = tls.ca_pem()? {
        let cert = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| ConfigError::Tls(format!("ca certificate: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }
    if let (Some(cert), Some(key)) = (tls.cert_pem()?, tls.key_pem()?) {
        let mut pem = cert;
        pem.extend_from_slice(&key);
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| ConfigError::Tls(format!("client identity: {e}")))?;
        builder = builder.identity(identity);
    }
    Ok(builder)
}

/// Reject bodies whose envelope carries a non-zero (4.x, integer) or
/// non-empty (5.x, string) `code` field.
fn check_embedded_code(uri: &str, value: &Value) -> Result<(), RequestError> {
    let Some(code) = value.get("code") else {
        return Ok(());
    };

    let failure = match code {
        Value::Number(num) => {
            let code = num.as_i64().unwrap_or(0);
            (code != 0).then(|| code.to_string())
        }
        Value::String(text) => (!text.is_empty()).then(|| text.clone()),
        _ => None,
    };

    if let Some(code) = failure {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Err(RequestError::Api {
            uri: uri.to_string(),
            code,
            message,
        });
    }
    Ok(())
}
