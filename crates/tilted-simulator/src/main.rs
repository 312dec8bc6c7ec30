//! Desktop simulator for the Tilted hydrometer pipeline.
//!
//! Runs both nodes in one process. The sensor node executes real wake cycles
//! against a simulated MPU-6050, battery and RTC memory on a virtual clock;
//! its radio frames land in the gateway's receive mailbox. The gateway then
//! derives gravity and publishes to whatever sinks the settings file enables,
//! over the host's real network.
//!
//! ```text
//! RUST_LOG=debug tilted-simulator --config tilted.env --cycles 5 --calibrate
//! ```

mod host;
mod sensor_node;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use clap::Parser;
use embassy_futures::block_on;
use log::{info, warn};

use tilted_core::config::{GatewayConfig, SensorConfig, keys};
use tilted_core::duty_cycle::{CycleMode, DutyCycleController, NoUpdateCheck, WakeReason};
use tilted_core::gateway::Gateway;
use tilted_core::publish::FanOutPublisher;
use tilted_core::radio::{MacAddress, PeeringConfig, RadioReceiver, Transmitter};
use tilted_core::sensors::Mpu6050;

use host::{HostClock, HostNetwork, LoopbackListener, RumqttClient, UreqHttp};
use sensor_node::{
    Hydrometer, LoopbackRadio, RtcMemory, SimulatedBattery, SimulatedMpuBus, VirtualClock,
};

// ---------------------------------------------------------------------------
// Scenario constants
// ---------------------------------------------------------------------------

/// Factory address of the simulated sensor board.
const SENSOR_ADDRESS: MacAddress = MacAddress([0x24, 0x0A, 0xC4, 0x5E, 0x11, 0x01]);

/// Tilt held during the first boot when `--calibrate` is given.
const GESTURE_TILT: f32 = 5.0;

/// Battery drain per wake, in millivolts.
const DRAIN_PER_WAKE: i32 = 3;

/// Rows of the terminal trend sparkline.
const SPARK: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// The radio "air": the receive mailbox the gateway's callback fills.
static AIR: RadioReceiver = RadioReceiver::new();

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "tilted-simulator", version, about = "Simulate the Tilted sensor and gateway")]
struct Args {
    /// Gateway settings file (dotenv format, keys as in `tilted.env.example`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of sensor wake cycles to run
    #[arg(short = 'n', long, default_value_t = 3)]
    cycles: u32,

    /// Starting tilt of the floating hydrometer in degrees
    #[arg(long, default_value_t = 45.0)]
    tilt: f32,

    /// Degrees the tilt drops per wake as the wort ferments
    #[arg(long, default_value_t = 0.5)]
    drift: f32,

    /// Wort temperature in °C
    #[arg(long, default_value_t = 20.0)]
    temperature: f32,

    /// Battery voltage at the first wake, in millivolts
    #[arg(long, default_value_t = 3300)]
    battery: i32,

    /// Hold the calibration gesture during the first boot
    #[arg(long)]
    calibrate: bool,

    /// Gravity formula; overrides `polynomial` from the settings file
    #[arg(long)]
    polynomial: Option<String>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Read a dotenv-style file into a key/value store. Keys are lower-cased so
/// `MQTT_SERVER` and `mqtt_server` are the same setting.
fn load_store(path: Option<&Path>) -> anyhow::Result<BTreeMap<String, String>> {
    let mut store = BTreeMap::new();
    let Some(path) = path else {
        return Ok(store);
    };

    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("cannot open settings file {}", path.display()))?;
    for entry in entries {
        let (key, value) =
            entry.with_context(|| format!("malformed line in {}", path.display()))?;
        store.insert(key.to_lowercase(), value);
    }
    Ok(store)
}

fn sparkline(points: &[u16], height: u16) -> String {
    points
        .iter()
        .map(|&y| {
            let level = (height - 1).saturating_sub(y) as usize;
            SPARK[level.min(SPARK.len() - 1)]
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut store = load_store(args.config.as_deref())?;
    if let Some(polynomial) = &args.polynomial {
        store.insert(keys::POLYNOMIAL.to_string(), polynomial.clone());
    }
    let config =
        GatewayConfig::load(&store).map_err(|e| anyhow!("invalid gateway settings: {e}"))?;
    if config.polynomial.is_empty() {
        warn!("No gravity polynomial configured, every reading will publish gravity 0");
    }
    if !config.any_sink_enabled() {
        info!("No sinks configured; readings stop at the gateway");
    }

    // Sensor node
    let first_tilt = if args.calibrate { GESTURE_TILT } else { args.tilt };
    let hydrometer = Hydrometer::new(first_tilt, args.temperature);
    let mut imu = Mpu6050::new(SimulatedMpuBus::new(hydrometer.clone()));
    block_on(imu.init()).map_err(|e| anyhow!("IMU setup failed: {e}"))?;

    let transmitter = Transmitter::new(
        LoopbackRadio::new(SENSOR_ADDRESS, &AIR),
        PeeringConfig::sensor(SENSOR_ADDRESS),
    );
    let mut node = DutyCycleController::new(
        SensorConfig::default(),
        imu,
        transmitter,
        VirtualClock::default(),
        SimulatedBattery::new(args.battery, DRAIN_PER_WAKE),
        RtcMemory::default(),
        NoUpdateCheck,
    );

    // Gateway node
    let publisher = FanOutPublisher::new(
        HostNetwork::default(),
        UreqHttp::new(),
        RumqttClient::default(),
    );
    let mut gateway = Gateway::new(
        config,
        PeeringConfig::gateway(),
        &AIR,
        LoopbackListener::default(),
        publisher,
        HostClock,
    );
    block_on(gateway.start()).map_err(|e| anyhow!("gateway radio failed: {e}"))?;

    let mut wake = WakeReason::ColdBoot;
    let mut tilt = args.tilt;

    for cycle in 1..=args.cycles {
        info!("=== Wake {} ({:?}) ===", cycle, wake);
        let report = block_on(node.run_cycle(wake));

        match report.mode {
            CycleMode::Calibration { iteration } => info!("Calibration iteration {}", iteration),
            CycleMode::Normal { low_battery: true } => warn!("Low battery mode"),
            CycleMode::Normal { .. } => {}
        }
        if report.timed_out {
            warn!("Wake {} hit the awake ceiling, nothing sent", cycle);
        }

        match block_on(gateway.poll()) {
            Some(result) => {
                info!(
                    "Gateway: gravity {:.3}{} from {}",
                    result.gravity.gravity,
                    if result.gravity.is_error() { " (formula error)" } else { "" },
                    result.reading.sender
                );
                for outcome in &result.outcomes {
                    match &outcome.error_detail {
                        None => info!("  {}: ok", outcome.sink),
                        Some(detail) => warn!("  {}: {}", outcome.sink, detail),
                    }
                }
            }
            None => warn!("Gateway received nothing on wake {}", cycle),
        }

        block_on(node.suspend(report.sleep));

        // The hydrometer goes back into the wort once the gesture was seen
        tilt = (tilt - args.drift).max(0.0);
        hydrometer.set_tilt(tilt);
        hydrometer.set_temperature(args.temperature + 0.3 * (cycle as f32).sin());
        wake = WakeReason::DeepSleep;
    }

    let history = gateway.history();
    if let Some(stats) = history.stats() {
        info!(
            "Gravity over {} reading(s): min {:.3} max {:.3} mean {:.3}",
            stats.count, stats.min, stats.max, stats.mean
        );
    }
    const TREND_HEIGHT: u16 = 8;
    if let Some(points) = history.plot_points(TREND_HEIGHT, 0.1) {
        info!("Trend {}", sparkline(&points, TREND_HEIGHT));
    }
    if AIR.dropped_frames() > 0 {
        warn!("{} malformed frame(s) dropped", AIR.dropped_frames());
    }

    Ok(())
}
