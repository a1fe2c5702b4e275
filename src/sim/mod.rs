//! # Link Simulator
//!
//! Runs the receiver link engine against a simulated transmitter over a
//! simulated air, in 1 ms steps:
//!
//! ```text
//! air.step -> radio interrupts -> systick -> main loop passes -> transmitter
//! ```
//!
//! This module handles:
//! - The shared medium and simulated transceivers (`air`)
//! - The transmitter end of the link (`transmitter`)
//! - `LinkSim`, wiring both ends to one engine with in-memory ports
//! - `run`, pacing a simulation in real time on the tokio runtime

pub mod air;
pub mod transmitter;

pub use air::{Air, Side, SimRadio};
pub use transmitter::SimTransmitter;

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::bind::BIND_PHRASE_LEN;
use crate::config::{Config, OutMode};
use crate::error::Result;
use crate::indicator::LogIndicator;
use crate::link::{LinkEngine, LinkPorts};
use crate::out::crsf::CrsfOutput;
use crate::out::{LinkOutput, LinkStatistics, NullOutput};
use crate::radio::{Antenna, Transceiver};
use crate::serial::BufferedSerial;
use crate::setup::MemorySetupStore;

/// Main loop passes per simulated millisecond
const POLLS_PER_MS: usize = 4;

/// Seed of the air's loss/corruption generator
const AIR_SEED: u64 = 0x6d6c_7273;

/// A receiver and a transmitter sharing one simulated air
pub struct LinkSim {
    air: Air,
    engine: LinkEngine<SimRadio>,
    transmitter: SimTransmitter,
    serial: BufferedSerial,
    out_port: BufferedSerial,
    store: MemorySetupStore,
}

impl LinkSim {
    /// Build and start a simulation of `config`
    ///
    /// Channel conditions come from `config.sim`. The transmitter shares the
    /// receiver's bind phrase, so both ends hop the same sequence.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the engine fails
    /// to start.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let link = config.resolve();
        let sim = config.sim.clone();

        let airtime_ms = (link.frame_rate_ms as u64 / 4).max(1);
        let air = Air::new(airtime_ms, AIR_SEED);
        air.set_loss_percent(sim.loss_percent);
        air.set_corrupt_percent(sim.corrupt_percent);

        let radio1 = air.radio(Side::Rx, Antenna::A1, sim.rssi_a1, sim.snr);
        let radio2 = link
            .needs_antenna2()
            .then(|| air.radio(Side::Rx, Antenna::A2, sim.rssi_a2, sim.snr));
        let transmitter = SimTransmitter::new(air.radio(Side::Tx, Antenna::A1, sim.rssi_a1, sim.snr), &link);

        let serial = BufferedSerial::default();
        let out_port = BufferedSerial::default();
        let store = MemorySetupStore::new(config.clone());
        let output: Box<dyn LinkOutput> = match config.rx.out_mode {
            OutMode::Crsf => Box::new(CrsfOutput::new(out_port.clone(), config.rx.failsafe_mode)),
            _ => Box::new(NullOutput),
        };

        let ports = LinkPorts {
            serial: Box::new(serial.clone()),
            output,
            indicator: Box::new(LogIndicator::new()),
            store: Box::new(store.clone()),
        };

        let mut engine = LinkEngine::new(config, radio1, radio2, ports);
        engine.start()?;
        debug!("Simulation started, airtime {} ms", airtime_ms);

        Ok(Self {
            air,
            engine,
            transmitter,
            serial,
            out_port,
            store,
        })
    }

    /// Advance by 1 ms
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to pack a frame or to store its
    /// setup.
    pub fn step(&mut self) -> Result<()> {
        self.air.step();

        for antenna in [Antenna::A1, Antenna::A2] {
            if !self.air.pending_irq(Side::Rx, antenna).is_empty() {
                self.engine.on_dio_irq(antenna);
            }
        }

        self.engine.on_systick();
        for _ in 0..POLLS_PER_MS {
            self.engine.poll()?;
        }

        self.transmitter.step();
        Ok(())
    }

    /// Advance by `ms` milliseconds
    pub fn run_ms(&mut self, ms: u64) -> Result<()> {
        for _ in 0..ms {
            self.step()?;
        }
        Ok(())
    }

    /// Put both ends into bind, the transmitter offering `bind_phrase`
    pub fn start_bind(&mut self, bind_phrase: [u8; BIND_PHRASE_LEN]) {
        let frame_rate_ms = self.engine.link_config().frame_rate_ms;
        self.engine.start_bind();
        self.transmitter.start_bind(bind_phrase, frame_rate_ms);
    }

    /// Return the transmitter to normal operation with the receiver's
    /// current link parameters
    pub fn finish_bind(&mut self) {
        let link = self.engine.link_config().clone();
        self.transmitter.stop_bind(&link);
    }

    pub fn engine(&self) -> &LinkEngine<SimRadio> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut LinkEngine<SimRadio> {
        &mut self.engine
    }

    pub fn transmitter(&self) -> &SimTransmitter {
        &self.transmitter
    }

    pub fn transmitter_mut(&mut self) -> &mut SimTransmitter {
        &mut self.transmitter
    }

    pub fn air(&self) -> &Air {
        &self.air
    }

    /// Host side of the receiver's serial passthrough
    pub fn serial(&self) -> &BufferedSerial {
        &self.serial
    }

    /// Host side of the receiver's RC output port
    pub fn out_port(&self) -> &BufferedSerial {
        &self.out_port
    }

    pub fn store(&self) -> &MemorySetupStore {
        &self.store
    }

    /// Simulated time in ms
    pub fn now_ms(&self) -> u64 {
        self.air.now_ms()
    }

    /// RF power of the receiver
    pub fn tx_power_dbm(&self) -> i8 {
        self.engine.radio1().rf_power_dbm()
    }
}

/// Run `sim` in real time for `duration`
///
/// # Arguments
///
/// * `sim` - Simulation to advance
/// * `duration` - Simulated (and wall clock) run time
/// * `report_every` - Interval of the `on_stats` callback
/// * `on_stats` - Receives a statistics snapshot every `report_every`
///
/// # Errors
///
/// Returns the first error of a simulation step
pub async fn run<F>(sim: &mut LinkSim, duration: Duration, report_every: Duration, mut on_stats: F) -> Result<()>
where
    F: FnMut(u64, &LinkStatistics),
{
    let total_ms = duration.as_millis() as u64;
    let report_ms = (report_every.as_millis() as u64).max(1);

    let mut ticker = interval(Duration::from_millis(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    for _ in 0..total_ms {
        ticker.tick().await;
        sim.step()?;

        let now = sim.now_ms();
        if now % report_ms == 0 {
            on_stats(now, &sim.engine().link_statistics());
        }
    }

    info!("Simulation finished after {} ms", sim.now_ms());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::command::Command;
    use crate::frame::rc::RcData;
    use crate::link::{ConnectionState, LinkTask, FIRMWARE_VERSION};
    use crate::radio::RxStatus;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.fhss.num_channels = 10;
        config
    }

    fn connected_sim(config: Config) -> LinkSim {
        let mut sim = LinkSim::new(config).unwrap();
        sim.run_ms(2000).unwrap();
        assert!(sim.engine().is_connected(), "Link should connect within 2 s");
        sim
    }

    #[test]
    fn test_link_connects_and_tracks_quality() {
        let mut sim = connected_sim(test_config());
        let antenna = sim.engine().transmit_antenna();

        sim.run_ms(1000).unwrap();
        let stats = sim.engine().link_statistics();

        assert!(stats.connected);
        assert!(stats.lq >= 90, "Clean channel should give high LQ, got {}", stats.lq);
        assert_eq!(stats.rssi1, -70);
        assert_eq!(stats.rssi2, -78);
        assert_eq!(sim.engine().transmit_antenna(), antenna, "Transmit antenna stable under constant RSSI");
        assert_eq!(antenna, Antenna::A1, "Stronger antenna is used for transmit");
        assert!(sim.transmitter().frames_received() > 40, "Transmitter hears the replies");
        assert_eq!(sim.engine().faults(), 0);
    }

    #[test]
    fn test_rc_data_reaches_output() {
        let mut sim = connected_sim(test_config());
        let mut rc = RcData::default();
        rc.ch[0] = 2047;
        rc.ch[10] = 0;
        sim.transmitter_mut().set_rc(rc);
        sim.out_port().drain();

        sim.run_ms(200).unwrap();

        assert_eq!(sim.engine().rc_data().ch[0], 2047);
        assert_eq!(sim.engine().rc_data().ch[10], 0);
        assert!(!sim.out_port().drain().is_empty(), "CRSF frames written while connected");
    }

    #[test]
    fn test_serial_passthrough_both_ways() {
        let mut sim = connected_sim(test_config());

        sim.transmitter_mut().write_serial(b"uplink");
        sim.serial().inject(b"downlink");
        sim.run_ms(200).unwrap();

        assert_eq!(sim.serial().drain(), b"uplink");
        assert_eq!(sim.transmitter_mut().take_serial(), b"downlink");
        assert!(sim.engine().stats().serial_data_received > 0);
    }

    #[test]
    fn test_diversity_prefers_valid_frame_over_rssi() {
        let mut config = test_config();
        config.sim.rssi_a1 = -80;
        config.sim.rssi_a2 = -95;
        let mut sim = LinkSim::new(config).unwrap();
        sim.air().set_corrupt_payload(Side::Rx, Antenna::A1, true);

        sim.run_ms(2000).unwrap();

        assert!(sim.engine().is_connected());
        assert_eq!(
            sim.engine().stats().last_antenna,
            Antenna::A2,
            "Fully valid frame on A2 wins over header-only frame on stronger A1"
        );
    }

    #[test]
    fn test_get_setup_data_command() {
        let mut config = test_config();
        config.rx.device_id = 4242;
        let mut sim = connected_sim(config);

        sim.transmitter_mut().send_command(Command::GetSetupData);
        sim.run_ms(100).unwrap();

        let data = sim.transmitter().setup_data().expect("Setup data reply");
        assert_eq!(data.device_id, 4242);
        assert_eq!(data.firmware_version, FIRMWARE_VERSION);
        assert_eq!(data.params, sim.engine().config().rx_params());
        assert_eq!(sim.engine().task(), LinkTask::None, "Normal frame acknowledges the response");
    }

    #[test]
    fn test_store_params_command_restarts() {
        let mut sim = connected_sim(test_config());

        sim.transmitter_mut().send_command(Command::StoreParams);
        sim.run_ms(100).unwrap();

        assert_eq!(sim.store().store_count(), 1);
        assert_eq!(sim.engine().restarts(), 1);
        assert!(sim.engine().is_running());

        sim.run_ms(2000).unwrap();
        assert!(sim.engine().is_connected(), "Link comes back after the restart");
    }

    #[test]
    fn test_connection_times_out_to_listen() {
        let mut sim = connected_sim(test_config());

        sim.air().set_blocked(Side::Rx, Antenna::A1, true);
        sim.air().set_blocked(Side::Rx, Antenna::A2, true);
        sim.run_ms(700).unwrap();

        assert_eq!(sim.engine().connection_state(), ConnectionState::Listen);
        assert_eq!(sim.engine().rxstats().get_lq(), 0, "LQ cleared while not connected");
        assert!(sim.engine().connection().occurred_once());
        assert_eq!(sim.engine().rx_status(), [RxStatus::None; 2]);
    }

    #[test]
    fn test_bind_stores_received_phrase() {
        let mut sim = LinkSim::new(test_config()).unwrap();
        sim.run_ms(100).unwrap();

        sim.start_bind(*b"abc.12");
        sim.run_ms(2000).unwrap();

        assert!(sim.transmitter().heard_receiver(), "Transmitter heard the receiver bind frame");
        assert_eq!(sim.store().store_count(), 1);
        assert_eq!(sim.store().stored().link.bind_phrase, "abc.12");
        assert!(!sim.engine().is_in_bind(), "Restart leaves bind");

        sim.finish_bind();
        sim.run_ms(2000).unwrap();
        assert!(sim.engine().is_connected(), "Link connects with the new phrase");
    }

    #[test]
    fn test_bind_ignores_unusable_phrase() {
        let mut sim = LinkSim::new(test_config()).unwrap();
        sim.run_ms(100).unwrap();

        sim.start_bind(*b"AB\x00 !z");
        sim.run_ms(2000).unwrap();

        assert_eq!(sim.store().store_count(), 0, "Nothing stored");
        assert!(sim.engine().is_in_bind(), "Still waiting for a usable bind frame");
        assert_eq!(sim.engine().config().link.bind_phrase, "mlrs.0");
        assert!(sim.engine().config().validate().is_ok());
    }

    #[test]
    fn test_startup_fails_with_dead_radio() {
        let config = test_config();
        let link = config.resolve();
        let air = Air::new(5, 1);
        let mut radio1 = air.radio(Side::Rx, Antenna::A1, -70, 8);
        radio1.set_alive(false);
        let ports = LinkPorts {
            serial: Box::new(BufferedSerial::default()),
            output: Box::new(NullOutput),
            indicator: Box::new(LogIndicator::new()),
            store: Box::new(MemorySetupStore::new(config.clone())),
        };

        let mut engine = LinkEngine::new(config, radio1, Some(air.radio(Side::Rx, Antenna::A2, -70, 8)), ports);
        assert!(link.needs_antenna1());
        assert!(engine.start().is_err());
        assert!(!engine.is_running());
    }

    #[test]
    fn test_async_run_reports_stats() {
        let mut sim = LinkSim::new(test_config()).unwrap();
        let mut reports = Vec::new();

        tokio_test::block_on(run(
            &mut sim,
            Duration::from_millis(300),
            Duration::from_millis(100),
            |now, stats| reports.push((now, *stats)),
        ))
        .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].0, 100);
        assert_eq!(reports[2].1.frame_rate_hz, 50);
    }
}
