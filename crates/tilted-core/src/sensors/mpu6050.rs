//! Register-level MPU-6050 driver over an async I2C bus

use embedded_hal_async::i2c::I2c;
use log::{error, info};

use super::{Imu, RawAcceleration, SensorError};

const SENSOR: &str = "MPU6050";

// Register map
const REG_SMPLRT_DIV: u8 = 0x19;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_INT_PIN_CFG: u8 = 0x37;
const REG_INT_ENABLE: u8 = 0x38;
const REG_INT_STATUS: u8 = 0x3A;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_TEMP_OUT_H: u8 = 0x41;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

const WHO_AM_I_EXPECTED: u8 = 0x68;

/// PLL with X gyro reference, sleep bit clear
const PWR_CLOCK_PLL_X: u8 = 0x01;
const PWR_SLEEP: u8 = 0x40;
/// 5 Hz digital low-pass filter
const DLPF_BW_5HZ: u8 = 0x06;
/// 1 kHz / (1 + 17) ≈ 55 Hz output rate
const SAMPLE_RATE_DIVIDER: u8 = 17;
/// ±250 °/s and ±2 g full scale
const FULL_SCALE_MIN: u8 = 0x00;
/// Active low, open drain, pulsed interrupt
const INT_ACTIVE_LOW_OPEN_DRAIN: u8 = 0xC0;
const INT_DATA_READY: u8 = 0x01;

pub struct Mpu6050<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Mpu6050<I> {
    pub const DEFAULT_ADDRESS: u8 = 0x68;

    pub fn new(i2c: I) -> Self {
        Self::with_address(i2c, Self::DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Verify the chip and configure it for slow, low-noise tilt sampling.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        let mut id = [0u8; 1];
        self.read_registers(REG_WHO_AM_I, &mut id, "read device id")
            .await?;
        if id[0] != WHO_AM_I_EXPECTED {
            error!("{} reported unexpected id {:#04x}", SENSOR, id[0]);
            return Err(SensorError::UnknownDevice {
                sensor: SENSOR,
                found: id[0],
            });
        }

        let setup = [
            (REG_PWR_MGMT_1, PWR_CLOCK_PLL_X),
            (REG_ACCEL_CONFIG, FULL_SCALE_MIN),
            (REG_GYRO_CONFIG, FULL_SCALE_MIN),
            (REG_CONFIG, DLPF_BW_5HZ),
            (REG_SMPLRT_DIV, SAMPLE_RATE_DIVIDER),
            (REG_INT_PIN_CFG, INT_ACTIVE_LOW_OPEN_DRAIN),
            (REG_INT_ENABLE, INT_DATA_READY),
        ];
        for (register, value) in setup {
            self.i2c
                .write(self.address, &[register, value])
                .await
                .map_err(|e| {
                    error!("{} configuration write {:#04x} failed: {:?}", SENSOR, register, e);
                    SensorError::InitializationFailed {
                        sensor: SENSOR,
                        details: "configuration write rejected",
                    }
                })?;
        }

        info!("{} initialised (±2g, DLPF 5Hz, data-ready interrupt)", SENSOR);
        Ok(())
    }

    /// Release the underlying bus.
    pub fn release(self) -> I {
        self.i2c
    }

    async fn read_registers(
        &mut self,
        register: u8,
        buffer: &mut [u8],
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write_read(self.address, &[register], buffer)
            .await
            .map_err(|e| {
                error!("{} {} failed: {:?}", SENSOR, operation, e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation,
                    details: "I2C communication error or sensor not responding",
                }
            })
    }
}

impl<I: I2c> Imu for Mpu6050<I> {
    async fn data_ready(&mut self) -> Result<bool, SensorError> {
        let mut status = [0u8; 1];
        self.read_registers(REG_INT_STATUS, &mut status, "read interrupt status")
            .await?;
        Ok(status[0] & INT_DATA_READY != 0)
    }

    async fn read_acceleration(&mut self) -> Result<RawAcceleration, SensorError> {
        let mut raw = [0u8; 6];
        self.read_registers(REG_ACCEL_XOUT_H, &mut raw, "read acceleration")
            .await?;

        // The chip is mounted with its Y and Z axes exchanged relative to
        // the hydrometer body.
        Ok(RawAcceleration {
            x: i16::from_be_bytes([raw[0], raw[1]]),
            y: i16::from_be_bytes([raw[4], raw[5]]),
            z: i16::from_be_bytes([raw[2], raw[3]]),
        })
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        let mut raw = [0u8; 2];
        self.read_registers(REG_TEMP_OUT_H, &mut raw, "read temperature")
            .await?;
        let counts = i16::from_be_bytes(raw) as f32;
        Ok(counts / 340.0 + 36.53)
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[REG_PWR_MGMT_1, PWR_CLOCK_PLL_X | PWR_SLEEP])
            .await
            .map_err(|e| {
                error!("{} sleep request failed: {:?}", SENSOR, e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation: "enter sleep mode",
                    details: "I2C communication error",
                }
            })
    }

    async fn wake(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[REG_PWR_MGMT_1, PWR_CLOCK_PLL_X])
            .await
            .map_err(|e| {
                error!("{} wake request failed: {:?}", SENSOR, e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation: "leave sleep mode",
                    details: "I2C communication error",
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::{ErrorType, Operation};

    /// Register file behind a fake bus. A write sets the register pointer and
    /// stores any trailing bytes; a read streams from the pointer.
    struct RegisterBus {
        registers: [u8; 128],
        pointer: usize,
    }

    impl RegisterBus {
        fn new() -> Self {
            let mut registers = [0u8; 128];
            registers[REG_WHO_AM_I as usize] = WHO_AM_I_EXPECTED;
            Self {
                registers,
                pointer: 0,
            }
        }
    }

    impl ErrorType for RegisterBus {
        type Error = Infallible;
    }

    impl I2c for RegisterBus {
        async fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for operation in operations.iter_mut() {
                match operation {
                    Operation::Write(bytes) => {
                        if let Some((register, data)) = bytes.split_first() {
                            self.pointer = *register as usize;
                            for (i, value) in data.iter().enumerate() {
                                self.registers[self.pointer + i] = *value;
                            }
                        }
                    }
                    Operation::Read(buffer) => {
                        for (i, slot) in buffer.iter_mut().enumerate() {
                            *slot = self.registers[self.pointer + i];
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_init_configures_registers() {
        let mut imu = Mpu6050::new(RegisterBus::new());
        block_on(imu.init()).unwrap();
        let bus = imu.release();

        assert_eq!(bus.registers[REG_PWR_MGMT_1 as usize], PWR_CLOCK_PLL_X);
        assert_eq!(bus.registers[REG_CONFIG as usize], DLPF_BW_5HZ);
        assert_eq!(bus.registers[REG_SMPLRT_DIV as usize], 17);
        assert_eq!(bus.registers[REG_INT_ENABLE as usize], INT_DATA_READY);
    }

    #[test]
    fn test_init_rejects_unknown_chip() {
        let mut bus = RegisterBus::new();
        bus.registers[REG_WHO_AM_I as usize] = 0x70;
        let mut imu = Mpu6050::new(bus);

        assert_eq!(
            block_on(imu.init()),
            Err(SensorError::UnknownDevice {
                sensor: SENSOR,
                found: 0x70
            })
        );
    }

    #[test]
    fn test_acceleration_axes_are_remapped() {
        let mut bus = RegisterBus::new();
        let base = REG_ACCEL_XOUT_H as usize;
        bus.registers[base..base + 6].copy_from_slice(&[0x00, 0x10, 0x00, 0x20, 0xFF, 0xFF]);
        let mut imu = Mpu6050::new(bus);

        let sample = block_on(imu.read_acceleration()).unwrap();

        assert_eq!(sample, RawAcceleration::new(0x10, -1, 0x20));
    }

    #[test]
    fn test_temperature_conversion() {
        let mut bus = RegisterBus::new();
        // -3400 counts -> -10 + 36.53
        let counts = (-3400i16).to_be_bytes();
        bus.registers[REG_TEMP_OUT_H as usize] = counts[0];
        bus.registers[REG_TEMP_OUT_H as usize + 1] = counts[1];
        let mut imu = Mpu6050::new(bus);

        let temperature = block_on(imu.read_temperature()).unwrap();

        assert!((temperature - 26.53).abs() < 1e-4);
    }

    #[test]
    fn test_sleep_sets_sleep_bit() {
        let mut imu = Mpu6050::new(RegisterBus::new());
        block_on(imu.sleep()).unwrap();
        let bus = imu.release();

        assert_ne!(bus.registers[REG_PWR_MGMT_1 as usize] & PWR_SLEEP, 0);
    }

    #[test]
    fn test_wake_clears_sleep_bit() {
        let mut imu = Mpu6050::new(RegisterBus::new());
        block_on(imu.init()).unwrap();
        block_on(imu.sleep()).unwrap();
        block_on(imu.wake()).unwrap();
        let bus = imu.release();

        assert_eq!(bus.registers[REG_PWR_MGMT_1 as usize], PWR_CLOCK_PLL_X);
    }
}
