//! Fixed-peer, fixed-channel radio hop between the sensor and the gateway
//!
//! The sensor broadcasts exactly one [`ReadingRecord`](crate::reading::ReadingRecord)
//! per wake with no acknowledgement and no retry. The gateway's radio driver
//! hands every frame to a [`RadioReceiver`] from its receive callback; the
//! receiver only validates the length and parks the record in a single-slot
//! mailbox for the poll loop.

mod receiver;
mod transmitter;

pub use receiver::{RadioReceiver, ReceivedReading};
pub use transmitter::Transmitter;

use core::fmt;
use core::future::Future;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    #[error("Radio stack failed to start: {0}")]
    InitFailed(&'static str),
    #[error("Radio stack not ready before the wake deadline")]
    InitTimeout,
    #[error("Radio is not initialised")]
    NotReady,
    #[error("Radio send failed: {0}")]
    SendFailed(&'static str),
    #[error("Invalid hardware address")]
    InvalidAddress,
}

/// Six-byte hardware address. Displays as `3A:33:33:33:33:33`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: Self = Self([0xFF; 6]);

    /// Address the gateway assumes for itself and the sensor sends to.
    pub const GATEWAY: Self = Self([0x3A, 0x33, 0x33, 0x33, 0x33, 0x33]);

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split([':', '-']);

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(RadioError::InvalidAddress)?;
            if part.len() != 2 {
                return Err(RadioError::InvalidAddress);
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| RadioError::InvalidAddress)?;
        }

        if parts.next().is_some() {
            return Err(RadioError::InvalidAddress);
        }
        Ok(Self(octets))
    }
}

/// Pairing established out of band: both nodes are built with matching values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringConfig {
    pub self_address: MacAddress,
    pub peer_address: MacAddress,
    pub channel: u8,
}

impl PeeringConfig {
    pub const DEFAULT_CHANNEL: u8 = 1;

    /// Sensor side: keep the factory address and send to the gateway.
    pub const fn sensor(self_address: MacAddress) -> Self {
        Self {
            self_address,
            peer_address: MacAddress::GATEWAY,
            channel: Self::DEFAULT_CHANNEL,
        }
    }

    /// Gateway side: take the well-known address and accept any sender.
    pub const fn gateway() -> Self {
        Self {
            self_address: MacAddress::GATEWAY,
            peer_address: MacAddress::BROADCAST,
            channel: Self::DEFAULT_CHANNEL,
        }
    }
}

impl Default for PeeringConfig {
    fn default() -> Self {
        Self::sensor(MacAddress::default())
    }
}

/// Sending half of the radio driver, used by the sensor node.
pub trait RadioLink {
    /// Bring the radio stack up and register the peer. May fail transiently.
    fn init(&mut self, peering: &PeeringConfig) -> impl Future<Output = Result<(), RadioError>>;

    /// Fire one unacknowledged frame at `peer`.
    fn send(
        &mut self,
        peer: MacAddress,
        frame: &[u8],
    ) -> impl Future<Output = Result<(), RadioError>>;

    fn power_down(&mut self) -> impl Future<Output = ()>;
}

/// Receiving half of the radio driver, used by the gateway node.
///
/// `listen` tunes the radio to the pairing channel and (re)installs the
/// receive callback, which must forward frames to
/// [`RadioReceiver::on_receive`]. It is called again after every publish
/// because joining Wi-Fi can move the radio to another channel.
pub trait RadioListener {
    fn listen(&mut self, peering: &PeeringConfig) -> impl Future<Output = Result<(), RadioError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_mac_display_is_upper_hex() {
        let mac = MacAddress([0x3a, 0x0b, 0xff, 0x00, 0x10, 0xc4]);
        assert_eq!(mac.to_string(), "3A:0B:FF:00:10:C4");
    }

    #[test]
    fn test_mac_parse() {
        assert_eq!("3a:33:33:33:33:33".parse(), Ok(MacAddress::GATEWAY));
        assert_eq!("3A-33-33-33-33-33".parse(), Ok(MacAddress::GATEWAY));
        assert_eq!(
            "3A:33:33:33:33".parse::<MacAddress>(),
            Err(RadioError::InvalidAddress)
        );
        assert_eq!(
            "3A:33:33:33:33:33:33".parse::<MacAddress>(),
            Err(RadioError::InvalidAddress)
        );
        assert_eq!(
            "3A:33:33:33:33:3G".parse::<MacAddress>(),
            Err(RadioError::InvalidAddress)
        );
    }

    #[test]
    fn test_default_pairing_targets_gateway() {
        let peering = PeeringConfig::default();

        assert_eq!(peering.peer_address.to_string(), "3A:33:33:33:33:33");
        assert_eq!(peering.channel, PeeringConfig::gateway().channel);
    }
}
