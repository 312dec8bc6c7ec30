//! Reading record exchanged between the sensor node and the gateway.
//!
//! Binary format (platform-native byte order, no padding):
//! - tilt: 4 bytes (f32, degrees)
//! - temperature: 4 bytes (f32, °C)
//! - battery_millivolts: 4 bytes (i32)
//! - sleep_interval_secs: 4 bytes (i32)
//!
//! Both nodes must be built for targets with the same byte order; the layout
//! is the contract, not a negotiated format.

/// Size of an encoded [`ReadingRecord`] in bytes.
pub const RECORD_SIZE: usize = 16;

/// One reading produced by the sensor node per wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadingRecord {
    /// Filtered tilt angle in degrees, one decimal
    pub tilt: f32,
    /// Temperature in °C, one decimal
    pub temperature: f32,
    /// Supply voltage in millivolts
    pub battery_millivolts: i32,
    /// Sleep interval the sensor will use after this reading
    pub sleep_interval_secs: i32,
}

impl ReadingRecord {
    /// Returns the encoded size of the record in bytes (16).
    pub const fn size() -> usize {
        RECORD_SIZE
    }

    /// Converts the record to its wire representation.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0..4].copy_from_slice(&self.tilt.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.temperature.to_ne_bytes());
        bytes[8..12].copy_from_slice(&self.battery_millivolts.to_ne_bytes());
        bytes[12..16].copy_from_slice(&self.sleep_interval_secs.to_ne_bytes());
        bytes
    }

    /// Creates a record from its wire representation.
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let field = |offset: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[offset..offset + 4]);
            raw
        };

        Self {
            tilt: f32::from_ne_bytes(field(0)),
            temperature: f32::from_ne_bytes(field(4)),
            battery_millivolts: i32::from_ne_bytes(field(8)),
            sleep_interval_secs: i32::from_ne_bytes(field(12)),
        }
    }

    /// Decodes a received frame. Frames of any other length are rejected.
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        let bytes: &[u8; RECORD_SIZE] = frame.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }
}
