//! Sink-specific payloads built from one published reading

use alloc::string::{String, ToString};
use core::fmt::Write;

use serde::Serialize;

use super::PublishData;

/// Message published to the broker topic
#[derive(Debug, Serialize)]
pub struct BrokerPayload {
    pub gravity: f32,
    pub tilt: f32,
    pub temp: f32,
    pub volt: i32,
    pub interval: i32,
}

impl From<&PublishData> for BrokerPayload {
    fn from(data: &PublishData) -> Self {
        Self {
            gravity: data.gravity,
            tilt: data.record.tilt,
            temp: data.record.temperature,
            volt: data.record.battery_millivolts,
            interval: data.record.sleep_interval_secs,
        }
    }
}

/// Body of the webhook POST (Brewfather custom stream format)
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub name: &'a str,
    pub temp: f32,
    pub temp_unit: &'static str,
    pub gravity: f32,
    pub gravity_unit: &'static str,
}

impl<'a> WebhookPayload<'a> {
    pub fn new(device_name: &'a str, data: &PublishData) -> Self {
        Self {
            name: device_name,
            temp: data.record.temperature,
            temp_unit: "C",
            gravity: data.gravity,
            gravity_unit: "G",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReading {
    pub sensor_id: String,
    pub gravity: f32,
    pub tilt: f32,
    pub temp: f32,
    pub volt: i32,
    pub interval: i32,
}

/// Body of the generic JSON API POST
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPayload {
    pub reading: ApiReading,
    pub gateway_id: String,
    pub gateway_name: String,
}

impl ApiPayload {
    pub fn new(device_name: &str, data: &PublishData) -> Self {
        Self {
            reading: ApiReading {
                sensor_id: data.sensor.to_string(),
                gravity: data.gravity,
                tilt: data.record.tilt,
                temp: data.record.temperature,
                volt: data.record.battery_millivolts,
                interval: data.record.sleep_interval_secs,
            },
            gateway_id: data.gateway.to_string(),
            gateway_name: device_name.to_string(),
        }
    }
}

/// Measurement name of the time-series point
pub const MEASUREMENT: &str = "tilted_data";

/// Escape a tag value for line protocol.
fn escape_tag(value: &str, out: &mut String) {
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// One line-protocol point:
/// `tilted_data,name=<device> gravity=..,tilt=..,temp=..,voltage=..i,interval=..i`
pub fn line_protocol(device_name: &str, data: &PublishData) -> String {
    let mut line = String::from(MEASUREMENT);
    line.push_str(",name=");
    escape_tag(device_name, &mut line);

    // Writing into a String cannot fail
    let _ = write!(
        line,
        " gravity={:.3},tilt={},temp={},voltage={}i,interval={}i",
        data.gravity,
        data.record.tilt,
        data.record.temperature,
        data.record.battery_millivolts,
        data.record.sleep_interval_secs,
    );
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::MacAddress;
    use crate::reading::ReadingRecord;

    fn data() -> PublishData {
        PublishData {
            sensor: MacAddress([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x01]),
            gateway: MacAddress::GATEWAY,
            record: ReadingRecord {
                tilt: 42.5,
                temperature: 19.5,
                battery_millivolts: 3300,
                sleep_interval_secs: 1800,
            },
            gravity: 1.012,
        }
    }

    #[test]
    fn test_broker_json() {
        let json = serde_json::to_string(&BrokerPayload::from(&data())).unwrap();
        assert_eq!(
            json,
            r#"{"gravity":1.012,"tilt":42.5,"temp":19.5,"volt":3300,"interval":1800}"#
        );
    }

    #[test]
    fn test_webhook_json() {
        let json = serde_json::to_string(&WebhookPayload::new("Fermenter", &data())).unwrap();
        assert_eq!(
            json,
            r#"{"name":"Fermenter","temp":19.5,"temp_unit":"C","gravity":1.012,"gravity_unit":"G"}"#
        );
    }

    #[test]
    fn test_api_json_uses_camel_case_and_mac_ids() {
        let value = serde_json::to_value(ApiPayload::new("Fermenter", &data())).unwrap();

        assert_eq!(value["reading"]["sensorId"], "24:0A:C4:00:00:01");
        assert_eq!(value["reading"]["volt"], 3300);
        assert_eq!(value["gatewayId"], "3A:33:33:33:33:33");
        assert_eq!(value["gatewayName"], "Fermenter");
    }

    #[test]
    fn test_line_protocol() {
        assert_eq!(
            line_protocol("Brew Room,1", &data()),
            "tilted_data,name=Brew\\ Room\\,1 gravity=1.012,tilt=42.5,temp=19.5,voltage=3300i,interval=1800i"
        );
    }
}
