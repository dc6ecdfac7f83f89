//! Error types shared across the exporter
//!
//! The management-API path distinguishes four failure classes so callers can
//! react to each one differently: transport problems are retried by the next
//! scrape, non-200 statuses carry the code (404 means "this edition doesn't
//! have the endpoint"), invalid JSON is fatal for the call, and a well-formed
//! envelope can still carry an embedded EMQX error code.

use reqwest::StatusCode;
use thiserror::Error;

/// Failures raised by a single management-API request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request {uri} failed: {source}")]
    Transport {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{uri}: unexpected status {status}")]
    Status { uri: String, status: StatusCode },

    #[error("response from {uri} isn't valid json: {source}")]
    Decode {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{uri}: api error code {code}{}", fmt_api_message(.message))]
    Api {
        uri: String,
        code: String,
        message: Option<String>,
    },

    #[error("unexpected payload from {uri}: {message}")]
    Payload { uri: String, message: String },
}

impl RequestError {
    /// True when the remote answered 404, i.e. the endpoint doesn't exist on
    /// this edition/version.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RequestError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

fn fmt_api_message(message: &Option<String>) -> String {
    match message {
        Some(msg) => format!(", msg={msg}"),
        None => String::new(),
    }
}

/// A [`RequestError`] annotated with the metric operation that hit it.
///
/// The gateway wraps every adapter failure in one of these so a scrape log
/// line names the collector that broke, not just the URI.
#[derive(Debug, Error)]
#[error("collect {operation} failed: {source}")]
pub struct CollectError {
    operation: &'static str,
    #[source]
    source: RequestError,
}

impl CollectError {
    pub fn new(operation: &'static str, source: RequestError) -> Self {
        Self { operation, source }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn source_error(&self) -> &RequestError {
        &self.source
    }
}

/// Failures inside one MQTT probe attempt.
///
/// These never cross the HTTP boundary as errors; the probe manager collapses
/// them to a boolean and logs the cause.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid probe target {0}")]
    InvalidTarget(String),

    #[error("mqtt connect to {target} failed: {reason}")]
    Connect { target: String, reason: String },

    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("connection to {0} is closed")]
    NotConnected(String),

    #[error("probe timed out after {0} seconds")]
    Timeout(u64),

    #[error("received a payload that doesn't match the probe message")]
    PayloadMismatch,
}
