//! In-memory implementations of every port, for unit tests

use std::string::{String, ToString};
use std::vec::Vec;

use embassy_time::{Duration, Instant};

use crate::config::WifiConfig;
use crate::duty_cycle::UpdateCheck;
use crate::publish::{HttpClient, HttpRequest, MqttClient, NetworkLink, TransportError};
use crate::radio::{MacAddress, PeeringConfig, RadioError, RadioLink, RadioListener};
use crate::sensors::{BatteryMonitor, Imu, RawAcceleration, SensorError};
use crate::storage::{BLOB_SIZE, PersistenceError, ScratchMemory};
use crate::time::Clock;

/// Plays back a list of samples, repeating the last one forever.
pub struct ScriptedImu {
    samples: Vec<RawAcceleration>,
    next: usize,
    temperature: f32,
    pub ready: bool,
    pub asleep: bool,
    pub reads: u32,
    pub sleep_calls: u32,
    pub wake_calls: u32,
}

impl ScriptedImu {
    pub fn new(samples: impl IntoIterator<Item = RawAcceleration>, temperature: f32) -> Self {
        Self {
            samples: samples.into_iter().collect(),
            next: 0,
            temperature,
            ready: true,
            asleep: false,
            reads: 0,
            sleep_calls: 0,
            wake_calls: 0,
        }
    }
}

impl Imu for ScriptedImu {
    async fn data_ready(&mut self) -> Result<bool, SensorError> {
        Ok(self.ready && !self.asleep)
    }

    async fn read_acceleration(&mut self) -> Result<RawAcceleration, SensorError> {
        self.reads += 1;
        let index = self.next.min(self.samples.len().saturating_sub(1));
        self.next += 1;
        Ok(self.samples.get(index).copied().unwrap_or_default())
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        Ok(self.temperature)
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.sleep_calls += 1;
        self.asleep = true;
        Ok(())
    }

    async fn wake(&mut self) -> Result<(), SensorError> {
        self.wake_calls += 1;
        self.asleep = false;
        Ok(())
    }
}

/// Virtual clock; `delay` advances time instantly.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Instant,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            now: Instant::from_ticks(0),
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.now
    }

    async fn delay(&mut self, duration: Duration) {
        self.now += duration;
    }
}

pub struct FixedBattery(pub i32);

impl BatteryMonitor for FixedBattery {
    async fn read_millivolts(&mut self) -> i32 {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryScratch {
    blob: [u8; BLOB_SIZE],
    pub writes: u32,
}

impl ScratchMemory for MemoryScratch {
    fn read(&mut self) -> [u8; BLOB_SIZE] {
        self.blob
    }

    fn write(&mut self, blob: &[u8; BLOB_SIZE]) -> Result<(), PersistenceError> {
        self.blob = *blob;
        self.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CountingUpdateCheck {
    pub calls: u32,
}

impl UpdateCheck for CountingUpdateCheck {
    async fn check_for_update(&mut self) {
        self.calls += 1;
    }
}

/// Radio that fails `init_failures` times before coming up and records
/// every frame sent.
#[derive(Debug, Default)]
pub struct FakeRadio {
    pub init_failures: u32,
    pub init_calls: u32,
    pub sent: Vec<(MacAddress, Vec<u8>)>,
    pub power_downs: u32,
}

impl RadioLink for FakeRadio {
    async fn init(&mut self, _peering: &PeeringConfig) -> Result<(), RadioError> {
        self.init_calls += 1;
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(RadioError::InitFailed("stack busy"));
        }
        Ok(())
    }

    async fn send(&mut self, peer: MacAddress, frame: &[u8]) -> Result<(), RadioError> {
        self.sent.push((peer, frame.to_vec()));
        Ok(())
    }

    async fn power_down(&mut self) {
        self.power_downs += 1;
    }
}

#[derive(Debug, Default)]
pub struct FakeListener {
    pub listens: u32,
    pub fail: bool,
}

impl RadioListener for FakeListener {
    async fn listen(&mut self, _peering: &PeeringConfig) -> Result<(), RadioError> {
        self.listens += 1;
        if self.fail {
            return Err(RadioError::InitFailed("listen"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeNetwork {
    pub connects: u32,
    pub disconnects: u32,
    pub fail: bool,
}

impl NetworkLink for FakeNetwork {
    async fn ensure_connected(&mut self, _wifi: &WifiConfig) -> Result<(), TransportError> {
        self.connects += 1;
        if self.fail {
            return Err(TransportError::Network("timeout".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

/// Records every request; answers `status` unless the URL is in `fail_urls`.
#[derive(Debug)]
pub struct FakeHttp {
    pub requests: Vec<HttpRequest>,
    pub status: u16,
    pub fail_urls: Vec<String>,
}

impl Default for FakeHttp {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            status: 200,
            fail_urls: Vec::new(),
        }
    }
}

impl HttpClient for FakeHttp {
    async fn post(&mut self, request: &HttpRequest) -> Result<u16, TransportError> {
        self.requests.push(request.clone());
        if self.fail_urls.iter().any(|u| *u == request.url) {
            return Err(TransportError::Http("connection refused".to_string()));
        }
        Ok(self.status)
    }
}

#[derive(Debug, Default)]
pub struct FakeMqtt {
    pub connect_failures: u32,
    pub connects: u32,
    pub published: Vec<(String, Vec<u8>, bool)>,
    pub disconnects: u32,
}

impl MqttClient for FakeMqtt {
    async fn connect(&mut self, _host: &str, _port: u16, _client_id: &str) -> Result<(), TransportError> {
        self.connects += 1;
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(TransportError::Mqtt("connection refused".to_string()));
        }
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        self.published
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}
