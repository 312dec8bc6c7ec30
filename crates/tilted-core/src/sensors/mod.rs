//! IMU and battery ports, plus the drivers that implement them

mod mpu6050;

pub use mpu6050::Mpu6050;

use core::future::Future;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: failed to {operation} ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: unexpected device id {found:#04x}")]
    UnknownDevice { sensor: &'static str, found: u8 },
}

/// Raw accelerometer counts in the hydrometer frame.
///
/// `z` runs along the body of the hydrometer. Drivers are responsible for
/// mapping their chip axes onto this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawAcceleration {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawAcceleration {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// An all-zero vector is what the bus returns when the read silently failed.
    pub const fn is_degenerate(&self) -> bool {
        self.x == 0 && self.y == 0 && self.z == 0
    }
}

/// Port for the orientation sensor on the sensor node.
pub trait Imu {
    /// Whether a fresh sample is waiting in the sensor.
    fn data_ready(&mut self) -> impl Future<Output = Result<bool, SensorError>>;

    /// Read one raw acceleration sample.
    fn read_acceleration(&mut self) -> impl Future<Output = Result<RawAcceleration, SensorError>>;

    /// Read the die temperature in °C.
    fn read_temperature(&mut self) -> impl Future<Output = Result<f32, SensorError>>;

    /// Put the sensor into its low-power mode.
    fn sleep(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Leave low-power mode so data-ready fires again.
    fn wake(&mut self) -> impl Future<Output = Result<(), SensorError>>;
}

/// Port for the supply voltage monitor.
pub trait BatteryMonitor {
    /// Supply voltage in millivolts. `0` means the reading is unavailable.
    fn read_millivolts(&mut self) -> impl Future<Output = i32>;
}
