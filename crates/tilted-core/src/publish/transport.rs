//! Network ports used by the fan-out publisher

use alloc::string::String;
use alloc::vec::Vec;
use core::future::Future;

use thiserror_no_std::Error;

use crate::config::WifiConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Wi-Fi did not connect: {0}")]
    Network(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("MQTT error: {0}")]
    Mqtt(String),
    #[error("Serialization failed")]
    Serialization,
}

/// One outgoing POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Station-mode network connection shared by every sink.
pub trait NetworkLink {
    /// Join the network unless already joined. Bounded by the
    /// implementation's own timeout.
    fn ensure_connected(
        &mut self,
        wifi: &WifiConfig,
    ) -> impl Future<Output = Result<(), TransportError>>;

    fn disconnect(&mut self) -> impl Future<Output = ()>;
}

pub trait HttpClient {
    /// Send one POST and return the response status code.
    fn post(&mut self, request: &HttpRequest) -> impl Future<Output = Result<u16, TransportError>>;
}

pub trait MqttClient {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        client_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>>;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> impl Future<Output = Result<(), TransportError>>;

    fn disconnect(&mut self) -> impl Future<Output = ()>;
}
