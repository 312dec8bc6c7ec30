//! Gateway node context and poll loop
//!
//! The radio driver's receive callback only fills the [`RadioReceiver`]
//! mailbox. Everything else happens here, on the main loop: derive gravity,
//! record it in the history and fan the reading out to the sinks.

use log::{error, info, warn};

use crate::config::GatewayConfig;
use crate::gravity::{self, GravityReading};
use crate::history::HistoryBuffer;
use crate::publish::{FanOutPublisher, HttpClient, MqttClient, NetworkLink, PublishData, PublishReport};
use crate::radio::{PeeringConfig, RadioError, RadioListener, RadioReceiver, ReceivedReading};
use crate::time::Clock;

/// What the gateway did with one received reading.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCycle {
    pub reading: ReceivedReading,
    pub gravity: GravityReading,
    pub outcomes: PublishReport,
}

impl GatewayCycle {
    pub fn all_sinks_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

/// Everything the gateway's main loop owns.
pub struct Gateway<'r, L, N, H, M, C> {
    config: GatewayConfig,
    peering: PeeringConfig,
    receiver: &'r RadioReceiver,
    listener: L,
    publisher: FanOutPublisher<N, H, M>,
    clock: C,
    history: HistoryBuffer,
}

impl<'r, L, N, H, M, C> Gateway<'r, L, N, H, M, C>
where
    L: RadioListener,
    N: NetworkLink,
    H: HttpClient,
    M: MqttClient,
    C: Clock,
{
    pub fn new(
        config: GatewayConfig,
        peering: PeeringConfig,
        receiver: &'r RadioReceiver,
        listener: L,
        publisher: FanOutPublisher<N, H, M>,
        clock: C,
    ) -> Self {
        Self {
            config,
            peering,
            receiver,
            listener,
            publisher,
            clock,
            history: HistoryBuffer::new(),
        }
    }

    /// Tune the radio and install the receive callback.
    pub async fn start(&mut self) -> Result<(), RadioError> {
        self.listener.listen(&self.peering).await?;
        info!(
            "Gateway {} listening as {} on channel {}",
            self.config.device_name, self.peering.self_address, self.peering.channel
        );
        Ok(())
    }

    /// Handle the waiting reading, if there is one.
    pub async fn poll(&mut self) -> Option<GatewayCycle> {
        let reading = self.receiver.try_take()?;
        Some(self.process(reading).await)
    }

    /// Wait for readings forever.
    pub async fn run(&mut self) {
        loop {
            let reading = self.receiver.wait().await;
            self.process(reading).await;
        }
    }

    pub async fn process(&mut self, reading: ReceivedReading) -> GatewayCycle {
        let record = reading.record;
        info!(
            "Reading from {}: tilt {} temp {} volt {} interval {}",
            reading.sender,
            record.tilt,
            record.temperature,
            record.battery_millivolts,
            record.sleep_interval_secs
        );

        let gravity = gravity::evaluate(&self.config.polynomial, record.tilt, record.temperature);
        if !gravity.is_error() {
            self.history.push(gravity.gravity);
        }

        let data = PublishData {
            sensor: reading.sender,
            gateway: self.peering.self_address,
            record,
            gravity: gravity.gravity,
        };
        let outcomes = self
            .publisher
            .publish(&self.config, &data, &mut self.clock)
            .await;

        let failed = outcomes.iter().filter(|o| !o.success).count();
        if failed > 0 {
            error!("{} of {} sink(s) failed", failed, outcomes.len());
        }

        // Joining Wi-Fi may have moved the radio off the pairing channel
        if self.config.any_sink_enabled() {
            if let Err(e) = self.listener.listen(&self.peering).await {
                warn!("Could not re-arm radio receiver: {}", e);
            }
        }

        GatewayCycle {
            reading,
            gravity,
            outcomes,
        }
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn publisher(&self) -> &FanOutPublisher<N, H, M> {
        &self.publisher
    }
}
