//! Gateway and sensor node configuration
//!
//! The gateway reads its settings once at startup from a key/value
//! [`ConfigStore`]. Every sink is optional: an empty endpoint disables it.
//! Changing the configuration means restarting the gateway, so the loaded
//! [`GatewayConfig`] is treated as read-only for the life of the run.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::sampling::{TiltFormula, WindowFilter};

/// Keys understood by [`GatewayConfig::load`]
pub mod keys {
    pub const DEVICE_NAME: &str = "device_name";
    pub const WIFI_SSID: &str = "wifi_ssid";
    pub const WIFI_PASSWORD: &str = "wifi_password";
    pub const POLYNOMIAL: &str = "polynomial";
    pub const MQTT_SERVER: &str = "mqtt_server";
    pub const MQTT_TOPIC: &str = "mqtt_topic";
    pub const BREWFATHER_URL: &str = "brewfather_url";
    pub const INFLUXDB_URL: &str = "influxdb_url";
    pub const INFLUXDB_ORG: &str = "influxdb_org";
    pub const INFLUXDB_BUCKET: &str = "influxdb_bucket";
    pub const INFLUXDB_TOKEN: &str = "influxdb_token";
    pub const API_URL: &str = "api_url";
}

pub const DEFAULT_DEVICE_NAME: &str = "TiltedGateway";
pub const DEFAULT_MQTT_TOPIC: &str = "tilted/data";
pub const DEFAULT_MQTT_PORT: u16 = 1883;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid broker port in '{0}'")]
    InvalidBrokerPort(String),
    #[error("Broker address '{0}' has no host")]
    MissingBrokerHost(String),
}

/// Read-only key/value settings source.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<&str>;
}

impl ConfigStore for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }
}

/// Trimmed value for `key`, `None` when unset or blank.
fn non_empty<'a, S: ConfigStore + ?Sized>(store: &'a S, key: &str) -> Option<&'a str> {
    store.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn owned_or<S: ConfigStore + ?Sized>(store: &S, key: &str, default: &str) -> String {
    non_empty(store, key).unwrap_or(default).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
}

impl BrokerConfig {
    /// Parse `host` or `host:port`.
    pub fn parse(address: &str, topic: &str) -> Result<Self, ConfigError> {
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidBrokerPort(address.to_string()))?;
                (host, port)
            }
            None => (address, DEFAULT_MQTT_PORT),
        };

        if host.is_empty() {
            return Err(ConfigError::MissingBrokerHost(address.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            topic: topic.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub url: String,
}

/// Everything the gateway needs for one run.
///
/// A sink is enabled exactly when its section is `Some`, which
/// [`GatewayConfig::load`] only produces for a non-empty endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub device_name: String,
    pub wifi: WifiConfig,
    /// Gravity expression over `tilt` and `temp`
    pub polynomial: String,
    pub broker: Option<BrokerConfig>,
    pub webhook: Option<WebhookConfig>,
    pub time_series: Option<TimeSeriesConfig>,
    pub api: Option<ApiConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            wifi: WifiConfig::default(),
            polynomial: String::new(),
            broker: None,
            webhook: None,
            time_series: None,
            api: None,
        }
    }
}

impl GatewayConfig {
    pub fn load<S: ConfigStore + ?Sized>(store: &S) -> Result<Self, ConfigError> {
        let broker = match non_empty(store, keys::MQTT_SERVER) {
            Some(address) => {
                let topic = owned_or(store, keys::MQTT_TOPIC, DEFAULT_MQTT_TOPIC);
                Some(BrokerConfig::parse(address, &topic)?)
            }
            None => None,
        };

        let time_series = non_empty(store, keys::INFLUXDB_URL).map(|url| TimeSeriesConfig {
            url: url.trim_end_matches('/').to_string(),
            org: owned_or(store, keys::INFLUXDB_ORG, ""),
            bucket: owned_or(store, keys::INFLUXDB_BUCKET, ""),
            token: owned_or(store, keys::INFLUXDB_TOKEN, ""),
        });

        Ok(Self {
            device_name: owned_or(store, keys::DEVICE_NAME, DEFAULT_DEVICE_NAME),
            wifi: WifiConfig {
                ssid: owned_or(store, keys::WIFI_SSID, ""),
                // Passwords may legitimately contain surrounding spaces
                password: store.get(keys::WIFI_PASSWORD).unwrap_or("").to_string(),
            },
            polynomial: owned_or(store, keys::POLYNOMIAL, ""),
            broker,
            webhook: non_empty(store, keys::BREWFATHER_URL).map(|url| WebhookConfig {
                url: url.to_string(),
            }),
            time_series,
            api: non_empty(store, keys::API_URL).map(|url| ApiConfig {
                url: url.to_string(),
            }),
        })
    }

    /// Whether any sink is configured at all.
    pub fn any_sink_enabled(&self) -> bool {
        self.broker.is_some()
            || self.webhook.is_some()
            || self.time_series.is_some()
            || self.api.is_some()
    }
}

/// Tunables for the sensor node's duty cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorConfig {
    pub normal_interval: Duration,
    pub calibration_interval: Duration,
    /// Wakes spent in calibration mode before it exits on its own
    pub calibration_cap: u32,
    /// Tilt band, exclusive on both ends, that starts calibration on a cold boot
    pub gesture_band: (f32, f32),
    pub setup_window: Duration,
    pub probe_period: Duration,
    /// Hard ceiling on time spent awake in one wake cycle
    pub wake_ceiling: Duration,
    pub low_battery_millivolts: i32,
    pub low_battery_multiplier: u32,
    pub poll_delay: Duration,
    pub radio_retry_delay: Duration,
    pub tilt_formula: TiltFormula,
    pub filter: WindowFilter,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            normal_interval: Duration::from_secs(1800),
            calibration_interval: Duration::from_secs(30),
            calibration_cap: 60,
            gesture_band: (0.0, 10.0),
            setup_window: Duration::from_secs(30),
            probe_period: Duration::from_secs(2),
            wake_ceiling: Duration::from_secs(10),
            low_battery_millivolts: 3000,
            low_battery_multiplier: 4,
            poll_delay: Duration::from_millis(5),
            radio_retry_delay: Duration::from_millis(5),
            tilt_formula: TiltFormula::default(),
            filter: WindowFilter::default(),
        }
    }
}

impl SensorConfig {
    pub fn in_gesture_band(&self, tilt: f32) -> bool {
        tilt > self.gesture_band.0 && tilt < self.gesture_band.1
    }

    /// `0` mV means the monitor could not read the supply and counts as low.
    pub fn is_low_battery(&self, millivolts: i32) -> bool {
        millivolts == 0 || millivolts <= self.low_battery_millivolts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_store_disables_all_sinks() {
        let config = GatewayConfig::load(&store(&[])).unwrap();

        assert_eq!(config.device_name, DEFAULT_DEVICE_NAME);
        assert!(!config.any_sink_enabled());
    }

    #[test]
    fn test_blank_endpoint_is_disabled() {
        let config = GatewayConfig::load(&store(&[(keys::BREWFATHER_URL, "   ")])).unwrap();
        assert!(config.webhook.is_none());
    }

    #[test]
    fn test_broker_defaults() {
        let config = GatewayConfig::load(&store(&[(keys::MQTT_SERVER, "broker.local")])).unwrap();
        let broker = config.broker.unwrap();

        assert_eq!(broker.host, "broker.local");
        assert_eq!(broker.port, DEFAULT_MQTT_PORT);
        assert_eq!(broker.topic, DEFAULT_MQTT_TOPIC);
    }

    #[test]
    fn test_broker_with_port() {
        let broker = BrokerConfig::parse("10.0.0.2:1884", "beer").unwrap();
        assert_eq!(broker.port, 1884);
        assert_eq!(broker.topic, "beer");
    }

    #[test]
    fn test_broker_bad_port() {
        let result = GatewayConfig::load(&store(&[(keys::MQTT_SERVER, "host:abc")]));
        assert_eq!(
            result,
            Err(ConfigError::InvalidBrokerPort("host:abc".to_string()))
        );
        assert!(BrokerConfig::parse(":1883", "t").is_err());
    }

    #[test]
    fn test_time_series_section() {
        let config = GatewayConfig::load(&store(&[
            (keys::INFLUXDB_URL, "http://influx:8086/"),
            (keys::INFLUXDB_ORG, "home"),
            (keys::INFLUXDB_BUCKET, "brew"),
            (keys::INFLUXDB_TOKEN, "secret"),
        ]))
        .unwrap();
        let ts = config.time_series.unwrap();

        assert_eq!(ts.url, "http://influx:8086");
        assert_eq!(ts.bucket, "brew");
        assert!(config.api.is_none());
    }

    #[test]
    fn test_low_battery_threshold() {
        let config = SensorConfig::default();

        assert!(config.is_low_battery(0));
        assert!(config.is_low_battery(3000));
        assert!(!config.is_low_battery(3001));
    }

    #[test]
    fn test_gesture_band_is_exclusive() {
        let config = SensorConfig::default();

        assert!(config.in_gesture_band(4.0));
        assert!(!config.in_gesture_band(0.0));
        assert!(!config.in_gesture_band(10.0));
    }
}
