//! Sink fan-out for the gateway
//!
//! Each configured sink gets the same derived reading in its own format. The
//! sinks are attempted one after another and each one's failure is recorded
//! and logged without affecting the others. The only resource they share is
//! the Wi-Fi connection, which is (re)acquired before every sink.

pub mod payload;
pub mod transport;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use core::fmt;

use embassy_time::Duration;
use heapless::Vec;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::{BrokerConfig, GatewayConfig, TimeSeriesConfig};
use crate::radio::MacAddress;
use crate::reading::ReadingRecord;
use crate::time::Clock;

pub use payload::{ApiPayload, BrokerPayload, WebhookPayload, line_protocol};
pub use transport::{HttpClient, HttpRequest, MqttClient, NetworkLink, TransportError};

/// Broker connection attempts per publish cycle
pub const BROKER_ATTEMPTS: u32 = 3;
/// Pause between broker connection attempts
pub const BROKER_RETRY_DELAY: Duration = Duration::from_secs(5);

const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Broker,
    Webhook,
    TimeSeries,
    Api,
}

impl SinkKind {
    pub const ALL: [SinkKind; 4] = [
        SinkKind::Broker,
        SinkKind::Webhook,
        SinkKind::TimeSeries,
        SinkKind::Api,
    ];

    pub fn is_enabled(self, config: &GatewayConfig) -> bool {
        match self {
            SinkKind::Broker => config.broker.is_some(),
            SinkKind::Webhook => config.webhook.is_some(),
            SinkKind::TimeSeries => config.time_series.is_some(),
            SinkKind::Api => config.api.is_some(),
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkKind::Broker => "MQTT",
            SinkKind::Webhook => "Brewfather",
            SinkKind::TimeSeries => "InfluxDB",
            SinkKind::Api => "API",
        };
        f.write_str(name)
    }
}

/// Result of one sink for one reading. Not kept past the publish cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub sink: SinkKind,
    pub success: bool,
    pub error_detail: Option<String>,
}

impl PublishOutcome {
    fn from_result(sink: SinkKind, result: Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => {
                info!("{} publish ok", sink);
                Self {
                    sink,
                    success: true,
                    error_detail: None,
                }
            }
            Err(e) => {
                error!("{} publish failed: {}", sink, e);
                Self {
                    sink,
                    success: false,
                    error_detail: Some(e.to_string()),
                }
            }
        }
    }
}

/// Everything a sink may include about one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishData {
    /// Radio address of the sensor, used as its identifier
    pub sensor: MacAddress,
    pub gateway: MacAddress,
    pub record: ReadingRecord,
    pub gravity: f32,
}

pub type PublishReport = Vec<PublishOutcome, 4>;

pub struct FanOutPublisher<N, H, M> {
    network: N,
    http: H,
    mqtt: M,
}

impl<N, H, M> FanOutPublisher<N, H, M>
where
    N: NetworkLink,
    H: HttpClient,
    M: MqttClient,
{
    pub fn new(network: N, http: H, mqtt: M) -> Self {
        Self {
            network,
            http,
            mqtt,
        }
    }

    /// Publish `data` to every enabled sink, in a fixed order.
    ///
    /// With no sink enabled this touches neither the network nor any client.
    pub async fn publish<C: Clock>(
        &mut self,
        config: &GatewayConfig,
        data: &PublishData,
        clock: &mut C,
    ) -> PublishReport {
        let mut report = PublishReport::new();

        if !config.any_sink_enabled() {
            debug!("No sinks configured, skipping publish");
            return report;
        }

        for sink in SinkKind::ALL {
            if !sink.is_enabled(config) {
                continue;
            }

            let result = match self.network.ensure_connected(&config.wifi).await {
                Ok(()) => self.publish_one(sink, config, data, clock).await,
                Err(e) => Err(e),
            };
            // At most four sinks, the report has room for all of them
            let _ = report.push(PublishOutcome::from_result(sink, result));
        }

        self.network.disconnect().await;
        report
    }

    async fn publish_one<C: Clock>(
        &mut self,
        sink: SinkKind,
        config: &GatewayConfig,
        data: &PublishData,
        clock: &mut C,
    ) -> Result<(), TransportError> {
        match sink {
            SinkKind::Broker => match &config.broker {
                Some(broker) => self.publish_broker(broker, &config.device_name, data, clock).await,
                None => Ok(()),
            },
            SinkKind::Webhook => match &config.webhook {
                Some(webhook) => {
                    let body = to_json(&WebhookPayload::new(&config.device_name, data))?;
                    self.post(sink, json_request(&webhook.url, body)).await
                }
                None => Ok(()),
            },
            SinkKind::TimeSeries => match &config.time_series {
                Some(ts) => {
                    let request = time_series_request(ts, &config.device_name, data);
                    self.post(sink, request).await
                }
                None => Ok(()),
            },
            SinkKind::Api => match &config.api {
                Some(api) => {
                    let body = to_json(&ApiPayload::new(&config.device_name, data))?;
                    self.post(sink, json_request(&api.url, body)).await
                }
                None => Ok(()),
            },
        }
    }

    async fn publish_broker<C: Clock>(
        &mut self,
        broker: &BrokerConfig,
        client_id: &str,
        data: &PublishData,
        clock: &mut C,
    ) -> Result<(), TransportError> {
        let payload = to_json(&BrokerPayload::from(data))?;

        let mut attempt = 1;
        loop {
            match self.mqtt.connect(&broker.host, broker.port, client_id).await {
                Ok(()) => break,
                Err(e) if attempt < BROKER_ATTEMPTS => {
                    warn!(
                        "MQTT connect attempt {}/{} failed: {}, retrying in {}s",
                        attempt,
                        BROKER_ATTEMPTS,
                        e,
                        BROKER_RETRY_DELAY.as_secs()
                    );
                    clock.delay(BROKER_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let result = self.mqtt.publish(&broker.topic, &payload, true).await;
        self.mqtt.disconnect().await;
        result
    }

    /// Single attempt; anything but a 2xx status is a failure.
    async fn post(&mut self, sink: SinkKind, request: HttpRequest) -> Result<(), TransportError> {
        let status = self.http.post(&request).await?;
        info!("{} responded with HTTP {}", sink, status);

        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(TransportError::Status(status))
        }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    pub fn mqtt(&self) -> &M {
        &self.mqtt
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<alloc::vec::Vec<u8>, TransportError> {
    serde_json::to_vec(value).map_err(|_| TransportError::Serialization)
}

fn json_request(url: &str, body: alloc::vec::Vec<u8>) -> HttpRequest {
    HttpRequest {
        url: url.to_string(),
        headers: vec![("Content-Type".to_string(), JSON.to_string())],
        body,
    }
}

fn time_series_request(ts: &TimeSeriesConfig, device_name: &str, data: &PublishData) -> HttpRequest {
    HttpRequest {
        url: format!(
            "{}/api/v2/write?org={}&bucket={}&precision=s",
            ts.url,
            encode_query(&ts.org),
            encode_query(&ts.bucket)
        ),
        headers: vec![
            (
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            ),
            ("Authorization".to_string(), format!("Token {}", ts.token)),
        ],
        body: line_protocol(device_name, data).into_bytes(),
    }
}

/// Percent-encode everything outside the unreserved set.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
