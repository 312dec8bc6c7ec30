//! Sensor node wake cycle
//!
//! Every wake runs the same state machine to completion:
//!
//! ```text
//! Init -> Sampling -> Processing -> Transmitting -> Sleeping
//!            |                                        ^
//!            +---------- awake ceiling exceeded ------+
//! ```
//!
//! `Init` decides between calibration and normal mode, `Sampling` fills the
//! sampler's window, `Processing` builds the wire record, `Transmitting`
//! broadcasts it once and `Sleeping` powers everything down, persists the
//! calibration counter and works out how long to sleep. Nothing in here
//! retries across wakes; a failed cycle just sleeps and tries again.

use core::future::Future;

use embassy_time::Duration;
use log::{debug, info, warn};

use crate::config::SensorConfig;
use crate::radio::{RadioLink, Transmitter};
use crate::reading::ReadingRecord;
use crate::sampling::{FilteredReading, OrientationSampler, SamplePoll};
use crate::sensors::{BatteryMonitor, Imu};
use crate::storage::{CalibrationState, ScratchMemory};
use crate::time::{Clock, Deadline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyCycleState {
    Init,
    Sampling,
    Processing,
    Transmitting,
    Sleeping,
}

/// Why the node is running this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Power-on or reset; the calibration gesture is only probed here.
    ColdBoot,
    /// Timer wake from deep sleep.
    DeepSleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    Normal { low_battery: bool },
    Calibration { iteration: u32 },
}

/// Hook run once when calibration is entered from a cold boot.
///
/// The firmware uses this to look for an update while the user is at the
/// hydrometer anyway. The update flow itself lives outside this crate.
pub trait UpdateCheck {
    fn check_for_update(&mut self) -> impl Future<Output = ()>;
}

/// [`UpdateCheck`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpdateCheck;

impl UpdateCheck for NoUpdateCheck {
    async fn check_for_update(&mut self) {}
}

/// What happened during one wake cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub mode: CycleMode,
    pub battery_millivolts: i32,
    /// Record handed to the radio, if sampling completed
    pub record: Option<ReadingRecord>,
    pub transmitted: bool,
    /// The awake ceiling cut sampling short
    pub timed_out: bool,
    pub awake: Duration,
    pub sleep: Duration,
}

/// Sleep remaining after `awake` of `interval`, or the whole interval if the
/// wake ran so long that less than half of it would be left.
pub fn sleep_duration(interval: Duration, awake: Duration) -> Duration {
    match interval.checked_sub(awake) {
        Some(remaining) if remaining > interval / 2 => remaining,
        _ => interval,
    }
}

pub struct DutyCycleController<I, R, C, B, M, U> {
    config: SensorConfig,
    sampler: OrientationSampler<I>,
    transmitter: Transmitter<R>,
    clock: C,
    battery: B,
    scratch: M,
    update: U,
    state: DutyCycleState,
}

impl<I, R, C, B, M, U> DutyCycleController<I, R, C, B, M, U>
where
    I: Imu,
    R: RadioLink,
    C: Clock,
    B: BatteryMonitor,
    M: ScratchMemory,
    U: UpdateCheck,
{
    pub fn new(
        config: SensorConfig,
        imu: I,
        transmitter: Transmitter<R>,
        clock: C,
        battery: B,
        scratch: M,
        update: U,
    ) -> Self {
        Self {
            sampler: OrientationSampler::new(imu, config.tilt_formula, config.filter),
            config,
            transmitter,
            clock,
            battery,
            scratch,
            update,
            state: DutyCycleState::Init,
        }
    }

    pub fn state(&self) -> DutyCycleState {
        self.state
    }

    fn enter(&mut self, state: DutyCycleState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Run one wake cycle from `Init` to `Sleeping`.
    ///
    /// Never fails: every error is logged and turned into a skipped step.
    /// The caller suspends the node for [`CycleReport::sleep`] afterwards.
    pub async fn run_cycle(&mut self, wake: WakeReason) -> CycleReport {
        let boot = self.clock.now();
        self.state = DutyCycleState::Init;
        self.sampler.reset().await;

        let mut calibration = CalibrationState::load(&mut self.scratch);
        let battery_millivolts = self.battery.read_millivolts().await;
        let (mode, interval) = self
            .classify_wake(wake, &mut calibration, battery_millivolts)
            .await;

        self.enter(DutyCycleState::Sampling);
        let deadline = Deadline::after(self.clock.now(), self.config.wake_ceiling);
        let filtered = self.sample(deadline).await;
        let timed_out = filtered.is_none() && deadline.expired(self.clock.now());

        let mut record = None;
        let mut transmitted = false;
        if let Some(reading) = filtered {
            self.enter(DutyCycleState::Processing);
            let built = ReadingRecord {
                tilt: reading.tilt,
                temperature: reading.temperature,
                battery_millivolts,
                sleep_interval_secs: interval.as_secs() as i32,
            };
            record = Some(built);

            self.enter(DutyCycleState::Transmitting);
            transmitted = self.transmit(&built, deadline).await;
        }

        self.enter(DutyCycleState::Sleeping);
        self.sampler.power_down().await;
        self.transmitter.power_down().await;
        if let Err(e) = calibration.save(&mut self.scratch) {
            warn!("Could not persist calibration state: {}", e);
        }

        let awake = self.clock.now() - boot;
        let sleep = sleep_duration(interval, awake);
        info!(
            "Deep sleeping {}s after {}ms awake",
            sleep.as_secs(),
            awake.as_millis()
        );

        CycleReport {
            mode,
            battery_millivolts,
            record,
            transmitted,
            timed_out,
            awake,
            sleep,
        }
    }

    /// Sit out the sleep on the node's clock. Boards with real deep sleep
    /// power off instead and come back through a reset.
    pub async fn suspend(&mut self, duration: Duration) {
        self.clock.delay(duration).await;
        self.state = DutyCycleState::Init;
    }

    async fn classify_wake(
        &mut self,
        wake: WakeReason,
        calibration: &mut CalibrationState,
        battery_millivolts: i32,
    ) -> (CycleMode, Duration) {
        match wake {
            WakeReason::ColdBoot => {
                if self.probe_gesture().await {
                    info!("Calibration gesture detected, entering calibration mode");
                    self.update.check_for_update().await;
                    calibration.iteration_count = 1;
                    return (
                        CycleMode::Calibration { iteration: 1 },
                        self.config.calibration_interval,
                    );
                }
            }
            WakeReason::DeepSleep => {
                if calibration.is_active()
                    && calibration.iteration_count < self.config.calibration_cap
                {
                    calibration.iteration_count += 1;
                    info!(
                        "Calibration mode, iteration {}/{}",
                        calibration.iteration_count, self.config.calibration_cap
                    );
                    return (
                        CycleMode::Calibration {
                            iteration: calibration.iteration_count,
                        },
                        self.config.calibration_interval,
                    );
                }
            }
        }

        *calibration = CalibrationState::INACTIVE;
        let low_battery = self.config.is_low_battery(battery_millivolts);
        let mut interval = self.config.normal_interval;
        if low_battery {
            warn!(
                "Battery at {}mV, sleeping {}x longer",
                battery_millivolts, self.config.low_battery_multiplier
            );
            interval = interval * self.config.low_battery_multiplier;
        } else {
            info!("Normal mode, battery at {}mV", battery_millivolts);
        }

        (CycleMode::Normal { low_battery }, interval)
    }

    /// Look for the calibration gesture for at most the setup window.
    async fn probe_gesture(&mut self) -> bool {
        let deadline = Deadline::after(self.clock.now(), self.config.setup_window);

        while !deadline.expired(self.clock.now()) {
            match self.sampler.probe_tilt().await {
                Ok(Some(tilt)) if self.config.in_gesture_band(tilt) => return true,
                Ok(_) => {}
                Err(e) => warn!("Gesture probe failed: {}", e),
            }
            self.clock.delay(self.config.probe_period).await;
        }
        false
    }

    /// Fill the window or give up at `deadline`.
    async fn sample(&mut self, deadline: Deadline) -> Option<FilteredReading> {
        let mut read_errors: u32 = 0;

        while !self.sampler.is_full() {
            if deadline.expired(self.clock.now()) {
                warn!(
                    "Awake ceiling reached with {} valid sample(s), {} rejected, {} read error(s)",
                    self.sampler.collected(),
                    self.sampler.rejected(),
                    read_errors
                );
                return None;
            }

            match self.sampler.poll().await {
                Ok(SamplePoll::Accepted { collected }) => {
                    debug!("Collected sample {}", collected);
                    if self.sampler.is_full() {
                        break;
                    }
                }
                Ok(SamplePoll::NotReady | SamplePoll::Rejected(_)) => {}
                Err(e) => {
                    read_errors += 1;
                    if read_errors == 1 {
                        warn!("IMU read failed: {}", e);
                    }
                }
            }
            self.clock.delay(self.config.poll_delay).await;
        }

        match self.sampler.finish().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Could not finish sampling: {}", e);
                None
            }
        }
    }

    async fn transmit(&mut self, record: &ReadingRecord, deadline: Deadline) -> bool {
        let retry_delay = self.config.radio_retry_delay;
        if let Err(e) = self
            .transmitter
            .start(&mut self.clock, deadline, retry_delay)
            .await
        {
            warn!("Skipping transmission: {}", e);
            return false;
        }

        match self.transmitter.send(record).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Transmission failed: {}", e);
                false
            }
        }
    }

    pub fn transmitter(&self) -> &Transmitter<R> {
        &self.transmitter
    }

    pub fn sampler(&self) -> &OrientationSampler<I> {
        &self.sampler
    }

    pub fn scratch(&self) -> &M {
        &self.scratch
    }

    pub fn update_check(&self) -> &U {
        &self.update
    }
}
