//! One live MQTT connection used for active probing
//!
//! Establishment is only considered done once the broker acknowledges the
//! subscription; everything after that is a publish/expect-echo round trip
//! on the probe topic. Every wait is bounded by the probe's keep-alive.
//! The event-loop task is aborted when the connection is dropped, so an
//! evicted registry entry never leaks a task.

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, MqttOptions};
use rumqttc::{TlsConfiguration, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Payload published on every probe round trip.
pub const PROBE_PAYLOAD: &[u8] = b"hello world";

const MESSAGE_BUFFER: usize = 16;
const REQUEST_BUFFER: usize = 10;

/// Link state reported by the event-loop task.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    /// Waiting for the broker to acknowledge connect + subscribe.
    Connecting,
    /// Subscription acknowledged - the round trip can start.
    Ready,
    /// Connection ended, with reason.
    Closed(String),
}

/// Build MQTT options for one probe target (pure function).
pub fn configure_probe_options(probe: &ProbeConfig) -> Result<MqttOptions, ProbeError> {
    let (host, port) = split_target(&probe.target, default_port(&probe.scheme))?;

    let mut options = MqttOptions::new(probe.client_id.clone(), host, port);
    options.set_keep_alive(Duration::from_secs(probe.keep_alive));
    if !probe.username.is_empty() {
        options.set_credentials(&probe.username, &probe.password);
    }

    if uses_tls(&probe.scheme) {
        let transport = match &probe.tls {
            Some(tls) => {
                let to_probe_err = |e: crate::config::ConfigError| ProbeError::Connect {
                    target: probe.target.clone(),
                    reason: e.to_string(),
                };
                let ca = tls.ca_pem().map_err(to_probe_err)?;
                let client_auth = match (
                    tls.cert_pem().map_err(to_probe_err)?,
                    tls.key_pem().map_err(to_probe_err)?,
                ) {
                    (Some(cert), Some(key)) => Some((cert, key)),
                    _ => None,
                };
                match ca {
                    Some(ca) => Transport::Tls(TlsConfiguration::Simple {
                        ca,
                        alpn: None,
                        client_auth,
                    }),
                    None => Transport::tls_with_default_config(),
                }
            }
            None => Transport::tls_with_default_config(),
        };
        options.set_transport(transport);
    }

    Ok(options)
}

fn uses_tls(scheme: &str) -> bool {
    matches!(scheme, "mqtts" | "ssl" | "tls")
}

fn default_port(scheme: &str) -> u16 {
    if uses_tls(scheme) {
        8883
    } else {
        1883
    }
}

fn split_target(target: &str, default_port: u16) -> Result<(String, u16), ProbeError> {
    let (host, port) = match target.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ProbeError::InvalidTarget(target.to_string()))?;
            (host, port)
        }
        None => (target, default_port),
    };
    if host.is_empty() {
        return Err(ProbeError::InvalidTarget(target.to_string()));
    }
    Ok((host.to_string(), port))
}

/// Map the configured QoS byte onto the protocol enum.
pub fn qos_level(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

/// A connected (or connecting) MQTT probe client plus its inbound channel.
pub struct MqttProbe {
    client: AsyncClient,
    messages: Mutex<mpsc::Receiver<Bytes>>,
    connected: Arc<AtomicBool>,
    state_rx: watch::Receiver<LinkState>,
    event_loop_handle: JoinHandle<()>,
    target: String,
}

impl MqttProbe {
    /// Connect, subscribe to the probe topic and wait for the subscription
    /// acknowledgment, bounded by the keep-alive-derived timeout.
    pub async fn establish(probe: &ProbeConfig) -> Result<Self, ProbeError> {
        let options = configure_probe_options(probe)?;
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_BUFFER);

        let (message_tx, message_rx) = mpsc::channel(MESSAGE_BUFFER);
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let connected = Arc::new(AtomicBool::new(false));

        let task_connected = connected.clone();
        let task_target = probe.target.clone();
        let event_loop_handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        debug!(target = %task_target, "mqtt broker acknowledged connect");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        task_connected.store(true, Ordering::Relaxed);
                        let _ = state_tx.send(LinkState::Ready);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        // A full buffer only drops surplus echoes
                        let _ = message_tx.try_send(publish.payload);
                    }
                    Ok(Event::Incoming(Packet::Disconnect(_))) => {
                        task_connected.store(false, Ordering::Relaxed);
                        let _ = state_tx.send(LinkState::Closed("server disconnect".to_string()));
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        task_connected.store(false, Ordering::Relaxed);
                        let _ = state_tx.send(LinkState::Closed(err.to_string()));
                        break;
                    }
                }
            }
        });

        let connection = Self {
            client,
            messages: Mutex::new(message_rx),
            connected,
            state_rx,
            event_loop_handle,
            target: probe.target.clone(),
        };

        // Subscribe request is queued now and flushed once the broker
        // accepts the connection.
        connection
            .client
            .subscribe(probe.topic.clone(), qos_level(probe.qos))
            .await
            .map_err(|e| ProbeError::Subscribe {
                topic: probe.topic.clone(),
                reason: e.to_string(),
            })?;

        connection
            .wait_until_ready(Duration::from_secs(probe.keep_alive))
            .await?;
        Ok(connection)
    }

    async fn wait_until_ready(&self, timeout: Duration) -> Result<(), ProbeError> {
        let mut state_rx = self.state_rx.clone();
        let target = self.target.clone();

        let wait = async move {
            loop {
                let state = state_rx.borrow_and_update().clone();
                match state {
                    LinkState::Ready => return Ok(()),
                    LinkState::Closed(reason) => {
                        return Err(ProbeError::Connect { target, reason });
                    }
                    LinkState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(ProbeError::Connect {
                        target,
                        reason: "event loop task ended".to_string(),
                    });
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout.as_secs())),
        }
    }

    /// Whether the broker has acknowledged the subscription and the link
    /// hasn't failed since.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !matches!(*self.state_rx.borrow(), LinkState::Closed(_))
    }

    /// Publish the probe payload and wait for its echo on the subscribed
    /// topic. Any stale inbound messages are drained first so an echo from
    /// a previous round trip can't satisfy this one.
    pub async fn round_trip(&self, probe: &ProbeConfig) -> Result<(), ProbeError> {
        if !self.is_connected() {
            return Err(ProbeError::NotConnected(probe.target.clone()));
        }

        let mut messages = self.messages.lock().await;
        while messages.try_recv().is_ok() {}

        self.client
            .publish(
                probe.topic.clone(),
                qos_level(probe.qos),
                false,
                PROBE_PAYLOAD,
            )
            .await
            .map_err(|e| ProbeError::Publish {
                topic: probe.topic.clone(),
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(Duration::from_secs(probe.keep_alive), messages.recv()).await {
            Ok(Some(payload)) if payload.as_ref() == PROBE_PAYLOAD => Ok(()),
            Ok(Some(_)) => Err(ProbeError::PayloadMismatch),
            Ok(None) => Err(ProbeError::NotConnected(probe.target.clone())),
            Err(_) => Err(ProbeError::Timeout(probe.keep_alive)),
        }
    }
}

impl Drop for MqttProbe {
    fn drop(&mut self) {
        self.event_loop_handle.abort();
    }
}
