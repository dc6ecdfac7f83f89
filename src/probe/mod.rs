//! Active MQTT probing
//!
//! A probe answers one question: can a client connect to this listener,
//! publish a message and get it back? The module keeps a live connection
//! per configured target so consecutive probes reuse one session:
//!
//! - [`connection`] - one MQTT link: options, establishment, round trip
//! - [`manager`] - the per-target registry, reuse and eviction

pub mod connection;
pub mod manager;

pub use connection::{MqttProbe, PROBE_PAYLOAD};
pub use manager::ProbeManager;
