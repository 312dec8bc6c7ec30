//! Gateway-side adapters for the host: real HTTP and MQTT, wall-clock time

use std::time::Duration as StdDuration;

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};

use tilted_core::config::WifiConfig;
use tilted_core::publish::{HttpClient, HttpRequest, MqttClient, NetworkLink, TransportError};
use tilted_core::radio::{PeeringConfig, RadioError, RadioListener};
use tilted_core::time::Clock;

const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const MQTT_TIMEOUT: StdDuration = StdDuration::from_secs(5);
const MQTT_KEEP_ALIVE: StdDuration = StdDuration::from_secs(30);

/// Wall-clock time from the embassy std driver.
#[derive(Debug, Default)]
pub struct HostClock;

impl Clock for HostClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn delay(&mut self, duration: Duration) {
        std::thread::sleep(StdDuration::from_micros(duration.as_micros()));
    }
}

/// The host is already online; this only tracks the connect/disconnect
/// bracket the publisher expects.
#[derive(Debug, Default)]
pub struct HostNetwork {
    connected: bool,
}

impl NetworkLink for HostNetwork {
    async fn ensure_connected(&mut self, wifi: &WifiConfig) -> Result<(), TransportError> {
        if !self.connected {
            info!(
                "Using host network in place of Wi-Fi '{}'",
                if wifi.ssid.is_empty() { "<unset>" } else { &wifi.ssid }
            );
            self.connected = true;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }
}

pub struct UreqHttp {
    agent: ureq::Agent,
}

impl UreqHttp {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build(),
        }
    }
}

impl Default for UreqHttp {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqHttp {
    async fn post(&mut self, request: &HttpRequest) -> Result<u16, TransportError> {
        let mut call = self.agent.post(&request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        match call.send_bytes(&request.body) {
            Ok(response) => Ok(response.status()),
            // ureq reports 4xx/5xx as errors; the publisher judges the status
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(e) => Err(TransportError::Http(e.to_string())),
        }
    }
}

/// Blocking MQTT session built on `rumqttc`'s synchronous client.
#[derive(Default)]
pub struct RumqttClient {
    session: Option<(Client, Connection)>,
}

impl RumqttClient {
    /// Drive the connection until `done` matches an incoming packet.
    fn wait_for(
        &mut self,
        what: &str,
        done: impl Fn(&Packet) -> bool,
    ) -> Result<(), TransportError> {
        let Some((_, connection)) = self.session.as_mut() else {
            return Err(TransportError::Mqtt("not connected".to_string()));
        };

        let deadline = std::time::Instant::now() + MQTT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Mqtt(format!("timed out waiting for {what}")));
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(packet))) if done(&packet) => return Ok(()),
                Ok(Ok(event)) => debug!("MQTT event {:?}", event),
                Ok(Err(e)) => return Err(TransportError::Mqtt(e.to_string())),
                Err(_) => return Err(TransportError::Mqtt(format!("timed out waiting for {what}"))),
            }
        }
    }
}

impl MqttClient for RumqttClient {
    async fn connect(&mut self, host: &str, port: u16, client_id: &str) -> Result<(), TransportError> {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(MQTT_KEEP_ALIVE);
        self.session = Some(Client::new(options, 10));

        let result = self.wait_for("CONNACK", |p| matches!(p, Packet::ConnAck(_)));
        if result.is_err() {
            self.session = None;
        }
        result
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        let Some((client, _)) = self.session.as_mut() else {
            return Err(TransportError::Mqtt("not connected".to_string()));
        };
        client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| TransportError::Mqtt(e.to_string()))?;

        self.wait_for("PUBACK", |p| matches!(p, Packet::PubAck(_)))
    }

    async fn disconnect(&mut self) {
        if let Some((client, mut connection)) = self.session.take() {
            if let Err(e) = client.disconnect() {
                warn!("MQTT disconnect failed: {}", e);
                return;
            }
            // Let the DISCONNECT packet reach the socket
            let _ = connection.recv_timeout(StdDuration::from_millis(200));
        }
    }
}

/// Gateway radio for the loopback setup: frames are delivered straight to
/// the shared receiver, so arming only has to be logged.
#[derive(Debug, Default)]
pub struct LoopbackListener {
    armed: u32,
}

impl RadioListener for LoopbackListener {
    async fn listen(&mut self, peering: &PeeringConfig) -> Result<(), RadioError> {
        self.armed += 1;
        debug!(
            "Receiver armed as {} on channel {} ({} time(s))",
            peering.self_address, peering.channel, self.armed
        );
        Ok(())
    }
}
