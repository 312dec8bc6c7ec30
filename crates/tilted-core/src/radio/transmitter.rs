//! Sensor-side sender: bounded radio bring-up and a single broadcast

use log::{debug, info, warn};

use super::{PeeringConfig, RadioError, RadioLink};
use crate::reading::ReadingRecord;
use crate::time::{Clock, Deadline};

pub struct Transmitter<R> {
    radio: R,
    peering: PeeringConfig,
    ready: bool,
}

impl<R: RadioLink> Transmitter<R> {
    pub fn new(radio: R, peering: PeeringConfig) -> Self {
        Self {
            radio,
            peering,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Retry radio init until it succeeds or `deadline` passes.
    pub async fn start<C: Clock>(
        &mut self,
        clock: &mut C,
        deadline: Deadline,
        retry_delay: embassy_time::Duration,
    ) -> Result<(), RadioError> {
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.radio.init(&self.peering).await {
                Ok(()) => {
                    debug!("Radio up after {} attempt(s)", attempts);
                    self.ready = true;
                    return Ok(());
                }
                Err(e) => {
                    if deadline.expired(clock.now()) {
                        warn!("Radio init gave up after {} attempts: {}", attempts, e);
                        return Err(RadioError::InitTimeout);
                    }
                    clock.delay(retry_delay).await;
                }
            }
        }
    }

    /// Broadcast one record to the peer. No acknowledgement, no retry.
    pub async fn send(&mut self, record: &ReadingRecord) -> Result<(), RadioError> {
        if !self.ready {
            return Err(RadioError::NotReady);
        }

        let frame = record.to_bytes();
        self.radio.send(self.peering.peer_address, &frame).await?;
        info!(
            "Sent reading to {} on channel {}",
            self.peering.peer_address, self.peering.channel
        );
        Ok(())
    }

    pub async fn power_down(&mut self) {
        self.radio.power_down().await;
        self.ready = false;
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}
