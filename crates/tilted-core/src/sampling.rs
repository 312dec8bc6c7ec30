//! Orientation sampling and window filtering for the sensor node
//!
//! The sampler pulls raw acceleration from an [`Imu`], converts each sample
//! to a tilt angle, throws away samples the sensor is known to produce on a
//! failed read and collects a fixed window. Once the window is full it
//! reduces it to one filtered tilt, reads the temperature once and puts the
//! IMU to sleep.

use alloc::vec::Vec;
use core::f32::consts::PI;

use heapless::Vec as WindowVec;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::rounding::round1;
use crate::sensors::{Imu, RawAcceleration, SensorError};

/// Number of valid samples reduced into one reading
pub const WINDOW_SIZE: usize = 5;

/// Tilt value the sensor produces when the bus read failed halfway.
const FAILED_READ_TILT: f32 = 90.0;

/// How a tilt angle is derived from the gravity vector.
///
/// The two formulas are not numerically equivalent; calibration polynomials
/// are only valid for the formula they were fitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TiltFormula {
    /// Euclidean combination of pitch and roll, as fitted by the deployed
    /// calibration polynomials.
    #[default]
    PitchRoll,
    /// Angle between the gravity vector and the hydrometer's long axis.
    GravityAxis,
}

impl TiltFormula {
    /// Tilt in degrees for a raw acceleration sample.
    pub fn tilt(self, sample: RawAcceleration) -> f32 {
        let (x, y, z) = (sample.x as f32, sample.y as f32, sample.z as f32);

        match self {
            Self::PitchRoll => {
                let pitch = libm::atan2f(y, libm::sqrtf(x * x + z * z)) * 180.0 / PI;
                let roll = libm::atan2f(x, libm::sqrtf(y * y + z * z)) * 180.0 / PI;
                libm::sqrtf(pitch * pitch + roll * roll)
            }
            Self::GravityAxis => {
                let magnitude = libm::sqrtf(x * x + y * y + z * z);
                if magnitude == 0.0 {
                    return 0.0;
                }
                let cosine = (z / magnitude).clamp(-1.0, 1.0);
                libm::acosf(cosine) * 180.0 / PI
            }
        }
    }
}

/// Whether a computed tilt can be trusted.
///
/// Zero comes from a degenerate vector and exactly 90° from a half-failed
/// read; both are discarded rather than counted.
pub fn is_valid_tilt(tilt: f32) -> bool {
    tilt.is_finite() && tilt > 0.0 && tilt != FAILED_READ_TILT
}

/// Reduction applied to a full window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowFilter {
    Mean,
    /// Middle value of the sorted window; a single outlier cannot move it.
    #[default]
    Median,
}

impl WindowFilter {
    /// Reduce `samples` to one value. Returns `None` for an empty window.
    pub fn apply(self, samples: &[f32]) -> Option<f32> {
        if samples.is_empty() {
            return None;
        }

        match self {
            Self::Mean => {
                let sum: f64 = samples.iter().map(|&s| s as f64).sum();
                Some((sum / samples.len() as f64) as f32)
            }
            Self::Median => {
                let mut sorted: Vec<f32> = samples.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 1 {
                    Some(sorted[mid])
                } else {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                }
            }
        }
    }
}

/// Outcome of one [`OrientationSampler::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplePoll {
    /// The IMU had no fresh sample.
    NotReady,
    /// A sample was read but failed validation.
    Rejected(f32),
    /// A sample was added; `collected` valid samples are now in the window.
    Accepted { collected: usize },
}

/// Filtered output of one full window, rounded for the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredReading {
    pub tilt: f32,
    pub temperature: f32,
}

pub struct OrientationSampler<I> {
    imu: I,
    formula: TiltFormula,
    filter: WindowFilter,
    window: WindowVec<f32, WINDOW_SIZE>,
    rejected: u32,
    imu_asleep: bool,
}

impl<I: Imu> OrientationSampler<I> {
    pub fn new(imu: I, formula: TiltFormula, filter: WindowFilter) -> Self {
        Self {
            imu,
            formula,
            filter,
            window: WindowVec::new(),
            rejected: 0,
            imu_asleep: false,
        }
    }

    /// Forget the previous wake's window and bring the IMU out of sleep.
    pub async fn reset(&mut self) {
        self.window.clear();
        self.rejected = 0;
        if let Err(e) = self.imu.wake().await {
            warn!("IMU did not acknowledge wake: {}", e);
        }
        self.imu_asleep = false;
    }

    pub fn collected(&self) -> usize {
        self.window.len()
    }

    pub fn is_full(&self) -> bool {
        self.window.is_full()
    }

    /// Number of samples discarded since the last reset.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Read one sample outside the window, used to probe for the
    /// calibration gesture. Returns `None` if the sample is invalid.
    pub async fn probe_tilt(&mut self) -> Result<Option<f32>, SensorError> {
        let sample = self.imu.read_acceleration().await?;
        let tilt = self.formula.tilt(sample);
        Ok(is_valid_tilt(tilt).then_some(tilt))
    }

    /// Try to add one sample to the window.
    pub async fn poll(&mut self) -> Result<SamplePoll, SensorError> {
        if self.is_full() {
            return Ok(SamplePoll::Accepted {
                collected: self.window.len(),
            });
        }

        if !self.imu.data_ready().await? {
            return Ok(SamplePoll::NotReady);
        }

        let sample = self.imu.read_acceleration().await?;
        let tilt = if sample.is_degenerate() {
            0.0
        } else {
            self.formula.tilt(sample)
        };

        if !is_valid_tilt(tilt) {
            self.rejected += 1;
            debug!("Discarding tilt sample {} ({:?})", tilt, sample);
            return Ok(SamplePoll::Rejected(tilt));
        }

        // Cannot fail: fullness was checked above.
        let _ = self.window.push(tilt);
        Ok(SamplePoll::Accepted {
            collected: self.window.len(),
        })
    }

    /// Reduce the full window, read the temperature and power the IMU down.
    ///
    /// Returns `None` while the window is still filling.
    pub async fn finish(&mut self) -> Result<Option<FilteredReading>, SensorError> {
        if !self.is_full() {
            return Ok(None);
        }

        let Some(tilt) = self.filter.apply(&self.window) else {
            return Ok(None);
        };
        let temperature = self.imu.read_temperature().await;
        self.power_down().await;
        let temperature = temperature?;

        Ok(Some(FilteredReading {
            tilt: round1(tilt),
            temperature: round1(temperature),
        }))
    }

    /// Put the IMU into low-power mode. Only the first call per wake reaches
    /// the sensor.
    pub async fn power_down(&mut self) {
        if self.imu_asleep {
            return;
        }
        if let Err(e) = self.imu.sleep().await {
            warn!("IMU did not acknowledge sleep: {}", e);
        }
        self.imu_asleep = true;
    }

    pub fn imu(&self) -> &I {
        &self.imu
    }
}
