//! Simulated sensor node hardware
//!
//! The node runs the real MPU-6050 driver against a register-level model of
//! the chip, so the I2C path, axis remapping and temperature conversion are
//! all exercised. Time is virtual: a 30 minute deep sleep returns instantly.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use embassy_time::{Duration, Instant};
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use log::{debug, info};

use tilted_core::radio::{MacAddress, PeeringConfig, RadioError, RadioLink, RadioReceiver};
use tilted_core::sensors::BatteryMonitor;
use tilted_core::storage::{BLOB_SIZE, PersistenceError, ScratchMemory};
use tilted_core::time::Clock;

// MPU-6050 registers served by the model
const REG_INT_STATUS: usize = 0x3A;
const REG_ACCEL_XOUT_H: usize = 0x3B;
const REG_TEMP_OUT_H: usize = 0x41;
const REG_PWR_MGMT_1: usize = 0x6B;
const REG_WHO_AM_I: usize = 0x75;

const PWR_SLEEP: u8 = 0x40;

/// Counts per g on the ±2 g range
const COUNTS_PER_G: f32 = 16384.0;

/// Physical state of the simulated hydrometer, shared with the scenario.
#[derive(Debug, Clone)]
pub struct Hydrometer {
    tilt: Rc<Cell<f32>>,
    temperature: Rc<Cell<f32>>,
}

impl Hydrometer {
    pub fn new(tilt: f32, temperature: f32) -> Self {
        Self {
            tilt: Rc::new(Cell::new(tilt)),
            temperature: Rc::new(Cell::new(temperature)),
        }
    }

    pub fn set_tilt(&self, degrees: f32) {
        self.tilt.set(degrees);
    }

    pub fn tilt(&self) -> f32 {
        self.tilt.get()
    }

    pub fn set_temperature(&self, celsius: f32) {
        self.temperature.set(celsius);
    }
}

/// Register file of an MPU-6050 whose outputs follow a [`Hydrometer`].
pub struct SimulatedMpuBus {
    hydrometer: Hydrometer,
    registers: [u8; 128],
    pointer: usize,
    reads: u32,
}

impl SimulatedMpuBus {
    pub fn new(hydrometer: Hydrometer) -> Self {
        let mut registers = [0u8; 128];
        registers[REG_WHO_AM_I] = 0x68;
        // The chip powers up asleep
        registers[REG_PWR_MGMT_1] = PWR_SLEEP;
        Self {
            hydrometer,
            registers,
            pointer: 0,
            reads: 0,
        }
    }

    /// Latch the current orientation and temperature into the output registers.
    fn refresh(&mut self) {
        self.reads = self.reads.wrapping_add(1);
        // Small deterministic wobble so the window filter has something to do
        let wobble = 0.2 * (self.reads as f32 * 1.7).sin();
        let radians = (self.hydrometer.tilt() + wobble).to_radians();

        let x: i16 = 0;
        let body_y = (radians.sin() * COUNTS_PER_G) as i16;
        let body_z = (radians.cos() * COUNTS_PER_G) as i16;
        // Chip Y carries the body's long axis, chip Z the pitch axis
        let raw = [x, body_z, body_y];
        for (i, value) in raw.iter().enumerate() {
            let bytes = value.to_be_bytes();
            self.registers[REG_ACCEL_XOUT_H + i * 2] = bytes[0];
            self.registers[REG_ACCEL_XOUT_H + i * 2 + 1] = bytes[1];
        }

        let counts = ((self.hydrometer.temperature.get() - 36.53) * 340.0) as i16;
        let bytes = counts.to_be_bytes();
        self.registers[REG_TEMP_OUT_H] = bytes[0];
        self.registers[REG_TEMP_OUT_H + 1] = bytes[1];
    }
}

impl ErrorType for SimulatedMpuBus {
    type Error = Infallible;
}

impl I2c for SimulatedMpuBus {
    async fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if let Some((&register, data)) = bytes.split_first() {
                        self.pointer = register as usize;
                        for (offset, value) in data.iter().enumerate() {
                            self.registers[(self.pointer + offset) % 128] = *value;
                        }
                    }
                }
                Operation::Read(buffer) => {
                    let asleep = self.registers[REG_PWR_MGMT_1] & PWR_SLEEP != 0;
                    match self.pointer {
                        REG_INT_STATUS => self.registers[REG_INT_STATUS] = u8::from(!asleep),
                        REG_ACCEL_XOUT_H if !asleep => self.refresh(),
                        _ => {}
                    }
                    for (offset, slot) in buffer.iter_mut().enumerate() {
                        *slot = self.registers[(self.pointer + offset) % 128];
                    }
                }
            }
        }
        Ok(())
    }
}

/// Virtual monotonic clock for the sensor node.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    micros: Rc<Cell<u64>>,
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.micros.get())
    }

    async fn delay(&mut self, duration: Duration) {
        self.micros.set(self.micros.get() + duration.as_micros());
    }
}

/// Cell that drains a little on every wake.
pub struct SimulatedBattery {
    millivolts: i32,
    drain_per_read: i32,
}

impl SimulatedBattery {
    pub fn new(millivolts: i32, drain_per_read: i32) -> Self {
        Self {
            millivolts,
            drain_per_read,
        }
    }
}

impl BatteryMonitor for SimulatedBattery {
    async fn read_millivolts(&mut self) -> i32 {
        let reading = self.millivolts;
        self.millivolts = (self.millivolts - self.drain_per_read).max(0);
        reading
    }
}

/// RTC user memory that survives the simulated deep sleep.
#[derive(Default)]
pub struct RtcMemory {
    blob: [u8; BLOB_SIZE],
}

impl ScratchMemory for RtcMemory {
    fn read(&mut self) -> [u8; BLOB_SIZE] {
        self.blob
    }

    fn write(&mut self, blob: &[u8; BLOB_SIZE]) -> Result<(), PersistenceError> {
        self.blob = *blob;
        Ok(())
    }
}

/// Radio whose "air" is the gateway's receive mailbox.
pub struct LoopbackRadio {
    address: MacAddress,
    air: &'static RadioReceiver,
    up: bool,
}

impl LoopbackRadio {
    pub fn new(address: MacAddress, air: &'static RadioReceiver) -> Self {
        Self {
            address,
            air,
            up: false,
        }
    }
}

impl RadioLink for LoopbackRadio {
    async fn init(&mut self, peering: &PeeringConfig) -> Result<(), RadioError> {
        debug!(
            "Radio up as {} on channel {}, peer {}",
            self.address, peering.channel, peering.peer_address
        );
        self.up = true;
        Ok(())
    }

    async fn send(&mut self, _peer: MacAddress, frame: &[u8]) -> Result<(), RadioError> {
        if !self.up {
            return Err(RadioError::NotReady);
        }
        // Delivery is the receive callback running on the gateway
        self.air.on_receive(self.address.octets(), frame);
        Ok(())
    }

    async fn power_down(&mut self) {
        if self.up {
            info!("Radio powered down");
        }
        self.up = false;
    }
}
