//! # Link Engine
//!
//! The receiver's scheduler: a TDD receive/transmit alternation driven by
//! radio interrupts and the frame clock.
//!
//! ```text
//! Receive -> ReceiveWait -> (post-receive) -> Transmit -> TransmitWait -> Receive
//!                        \-> Receive (listen: nothing valid, or hop)
//! ```
//!
//! Three entry points mirror the firmware's execution contexts:
//! - `on_dio_irq` is the radio interrupt: it only parks status bits
//! - `on_systick` is the 1 ms tick: clock, timeouts, LEDs, auto bind
//! - `poll` is one main loop pass: all decisions happen here

pub mod clock;
pub mod connection;
pub mod task;

pub use clock::FrameClock;
pub use connection::{ConnectionState, ConnectionTracker};
pub use task::{LinkTask, TaskSlot};

use std::fmt;

use tracing::{debug, error, info, trace, warn};

use crate::bind::{Bind, BindTask, RxBindData};
use crate::config::{AntennaMode, BuzzerMode, Config, LinkConfig};
use crate::diversity::{RxDiversity, TxDiversity};
use crate::error::{LinkError, Result};
use crate::fhss::Fhss;
use crate::frame::command::{Command, SetupData};
use crate::frame::decoder::{check_tx_frame, decode_status, tx_frame_rx_status, CheckError, TxFrame};
use crate::frame::encoder::pack_rx_frame;
use crate::frame::protocol::{FrameStats, FrameStatus, FrameType, BIND_TX_SIGNATURE, FRAME_LEN, FRAME_RX_PAYLOAD_LEN, RSSI_MIN};
use crate::frame::rc::{RcData, RC1_NUM_CHANNELS};
use crate::indicator::{FailPattern, Indicator, LedBlinker, LedMode};
use crate::link_quality::RxStats;
use crate::out::{LinkOutput, LinkStatistics};
use crate::radio::irq::{service_dio, IrqSlot, RxFilter};
use crate::radio::{Antenna, IrqStatus, RxStatus, Transceiver};
use crate::serial::SerialPort;
use crate::setup::SetupStore;
use crate::stats::{Stats, SEQ_NO_NONE};

/// Firmware version reported in setup data and bind frames (major.minor.patch)
pub const FIRMWARE_VERSION: u32 = 0x00_01_00;

/// Main loop passes between post-receive and output
const POST_RECEIVE2_LOOPS: u8 = 5;

/// Pending radio operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Arm the radios for receive
    Receive,
    /// Waiting for receive-done or the frame clock
    ReceiveWait,
    /// Send the reply
    Transmit,
    /// Waiting for transmit-done
    TransmitWait,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Receive => "receive",
            LinkState::ReceiveWait => "receive wait",
            LinkState::Transmit => "transmit",
            LinkState::TransmitWait => "transmit wait",
        };
        write!(f, "{}", s)
    }
}

/// Collaborators of the engine
pub struct LinkPorts {
    /// Serial passthrough
    pub serial: Box<dyn SerialPort>,
    /// RC data and link statistics sink
    pub output: Box<dyn LinkOutput>,
    /// LEDs and buzzer
    pub indicator: Box<dyn Indicator>,
    /// Persistence of the setup record
    pub store: Box<dyn SetupStore>,
}

/// Receiver link engine over one or two transceivers
pub struct LinkEngine<R: Transceiver> {
    config: Config,
    link: LinkConfig,

    radio1: R,
    radio2: Option<R>,
    irq: [IrqSlot; 2],
    filter: RxFilter,
    ports: LinkPorts,

    link_state: LinkState,
    connection: ConnectionTracker,
    fhss: Fhss,
    rdiversity: RxDiversity,
    tdiversity: TxDiversity,
    rxstats: RxStats,
    stats: Stats,
    bind: Bind,
    task: TaskSlot,
    clock: FrameClock,
    leds: LedBlinker,
    shown_leds: Option<(bool, bool)>,

    rx_status: [RxStatus; 2],
    rx_buf: [[u8; FRAME_LEN]; 2],
    rc: RcData,
    frame_missed: bool,
    tick_1hz_commensurate: u16,
    post_receive2_cnt: u8,
    params_store: bool,

    running: bool,
    restarts: u32,
    faults: u32,
}

impl<R: Transceiver> LinkEngine<R> {
    /// Create an engine from the persisted setup
    ///
    /// # Arguments
    ///
    /// * `config` - Setup record, resolved once here and again on every restart
    /// * `radio1` - Transceiver on antenna 1
    /// * `radio2` - Transceiver on antenna 2, if the board has one
    /// * `ports` - Serial, output, indicator and setup store
    pub fn new(config: Config, radio1: R, radio2: Option<R>, ports: LinkPorts) -> Self {
        let link = config.resolve();
        let filter = RxFilter::new(link.sync_word, BIND_TX_SIGNATURE);

        Self {
            connection: ConnectionTracker::new(link.connect_sync_cnt, link.connect_tmo_systicks, link.connect_listen_hop_cnt),
            fhss: Fhss::new(link.fhss.clone()),
            rdiversity: RxDiversity::new(),
            tdiversity: TxDiversity::new(link.frame_rate_ms),
            rxstats: RxStats::new(link.lq_averaging_period),
            stats: Stats::new(),
            bind: Bind::new(own_bind_data(&link), link.auto_bind_tmo_ms),
            task: TaskSlot::new(),
            clock: FrameClock::new(link.frame_rate_ms),
            leds: LedBlinker::new(),
            shown_leds: None,
            link_state: LinkState::Receive,
            rx_status: [RxStatus::None; 2],
            rx_buf: [[0u8; FRAME_LEN]; 2],
            rc: RcData::default(),
            frame_missed: false,
            tick_1hz_commensurate: 0,
            post_receive2_cnt: 0,
            params_store: false,
            running: false,
            restarts: 0,
            faults: 0,
            irq: [IrqSlot::new(), IrqSlot::new()],
            filter,
            ports,
            radio1,
            radio2,
            config,
            link,
        }
    }

    /// Bring up the radios and enter Listen/Receive
    ///
    /// # Errors
    ///
    /// Returns `LinkError::RadioNotResponding` if a radio required by the
    /// antenna setup fails its health check. The fail pattern is shown and
    /// the engine stays halted.
    pub fn start(&mut self) -> Result<()> {
        self.running = false;

        self.radio1.init();
        if let Some(radio2) = self.radio2.as_mut() {
            radio2.init();
        }

        if self.link.needs_antenna1() && !self.radio1.is_ok() {
            return Err(self.fatal(Antenna::A1, FailPattern::GreenOffRedBlink));
        }
        if self.link.needs_antenna2() && !self.radio2.as_ref().is_some_and(|r| r.is_ok()) {
            return Err(self.fatal(Antenna::A2, FailPattern::RedOffGreenBlink));
        }

        self.irq[0].clear();
        self.irq[1].clear();
        if self.link.needs_antenna1() {
            self.radio1.start_up(&self.link.radio);
        }
        if self.link.needs_antenna2() {
            if let Some(radio2) = self.radio2.as_mut() {
                radio2.start_up(&self.link.radio);
            }
        }

        self.fhss.start();
        let freq = self.fhss.curr_freq();
        self.for_each_radio(|radio| radio.set_rf_frequency(freq));

        self.running = true;
        info!(
            "Link engine started: {} Hz, {} channels on {:?}, rx {:?}, tx {:?}",
            self.link.frame_rate_hz,
            self.fhss.cnt(),
            self.link.fhss.band,
            self.link.receive_antenna,
            self.link.transmit_antenna
        );
        Ok(())
    }

    fn fatal(&mut self, antenna: Antenna, pattern: FailPattern) -> LinkError {
        let message = format!("Radio on {} not responding", antenna);
        error!("{}", message);
        self.ports.indicator.fail(pattern, &message);
        LinkError::RadioNotResponding { antenna }
    }

    /// Radio DIO interrupt of `antenna`
    pub fn on_dio_irq(&mut self, antenna: Antenna) {
        let slot = &self.irq[antenna.index()];
        match antenna {
            Antenna::A1 => service_dio(&mut self.radio1, slot, &self.filter),
            Antenna::A2 => {
                if let Some(radio2) = self.radio2.as_mut() {
                    service_dio(radio2, slot, &self.filter);
                }
            }
        }
    }

    /// 1 ms system tick
    pub fn on_systick(&mut self) {
        self.clock.tick();
        self.connection.tick();

        let mode = if self.bind.is_in_bind() {
            LedMode::Bind
        } else if self.connection.is_connected() {
            LedMode::Connected
        } else {
            LedMode::Disconnected
        };
        let (green, red) = self.leds.tick(mode);
        self.show_leds(green, red);

        if !self.connection.occurred_once() {
            self.bind.auto_bind();
        }
    }

    /// One main loop pass
    ///
    /// # Errors
    ///
    /// Returns error if a frame cannot be packed or storing the setup
    /// failed. The engine keeps running in both cases.
    pub fn poll(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        loop {
            self.process_link_state()?;
            self.process_irq(Antenna::A1);
            self.process_irq(Antenna::A2);

            let link_state_before = self.link_state;
            if self.clock.take_trigger() {
                self.post_receive();
            }
            // a new link state is acted on right away
            if self.link_state == link_state_before {
                break;
            }
        }

        self.post_receive2();

        if self.params_store {
            return self.store_params();
        }
        Ok(())
    }

    /// Enter bind mode, takes effect at the next post-receive
    pub fn start_bind(&mut self) {
        self.bind.start_bind();
    }

    fn process_link_state(&mut self) -> Result<()> {
        match self.link_state {
            LinkState::Receive => {
                if self.connection.state() >= ConnectionState::Sync {
                    self.fhss.hop_to_next();
                }
                let freq = self.fhss.curr_freq();

                self.irq[0].clear();
                self.irq[1].clear();
                self.for_each_radio(|radio| radio.set_rf_frequency(freq));
                if self.link.receive_antenna.uses_antenna1() {
                    self.radio1.set_to_rx(0);
                }
                if self.link.receive_antenna.uses_antenna2() {
                    if let Some(radio2) = self.radio2.as_mut() {
                        radio2.set_to_rx(0);
                    }
                }

                self.link_state = LinkState::ReceiveWait;
                self.rx_status = [RxStatus::None; 2];
                trace!("RX armed on {} Hz", freq);
            }
            LinkState::Transmit => {
                self.irq[0].clear();
                self.irq[1].clear();
                self.do_transmit(self.tdiversity.antenna())?;
                self.link_state = LinkState::TransmitWait;
            }
            LinkState::ReceiveWait | LinkState::TransmitWait => {}
        }
        Ok(())
    }

    fn process_irq(&mut self, antenna: Antenna) {
        let mut status = self.irq[antenna.index()].take();
        if status.is_empty() {
            return;
        }

        match self.link_state {
            LinkState::TransmitWait if status.contains(IrqStatus::TX_DONE) => {
                // any other bit raised with it is a fault
                status = status.without(IrqStatus::TX_DONE);
                self.link_state = LinkState::Receive;
                trace!("TX done on {}", antenna);
            }
            LinkState::ReceiveWait if status.contains(IrqStatus::RX_DONE) => {
                status = status.without(IrqStatus::RX_DONE);
                let do_clock_reset = self.rx_status[antenna.other().index()] == RxStatus::None;
                let rx_status = self.do_receive(antenna, do_clock_reset);
                self.rx_status[antenna.index()] = rx_status;
                if rx_status == RxStatus::Valid {
                    if let Some(radio) = self.radio_mut(antenna) {
                        radio.handle_afc();
                    }
                }
                trace!("RX done on {}: {}", antenna, rx_status);
            }
            _ => {}
        }

        if !status.is_empty() {
            self.protocol_fault(antenna, status);
        }
    }

    fn protocol_fault(&mut self, antenna: Antenna, status: IrqStatus) {
        let (tmo, rx_done, tx_done) = match antenna {
            Antenna::A1 => (FailPattern::BlinkCommon, FailPattern::GreenOffRedBlink, FailPattern::RedOffGreenBlink),
            Antenna::A2 => (FailPattern::BlinkAlternate, FailPattern::GreenOnRedBlink, FailPattern::RedOnGreenBlink),
        };
        let context = format!(
            "irq {} on {}, state {}, rx1 {}, rx2 {}",
            status, antenna, self.link_state, self.rx_status[0], self.rx_status[1]
        );
        error!("Protocol fault: {}", context);

        if status.contains(IrqStatus::TIMEOUT) {
            self.ports.indicator.fail(tmo, &format!("IRQ timeout fail: {}", context));
        }
        if status.contains(IrqStatus::RX_DONE) {
            self.ports.indicator.fail(rx_done, &format!("IRQ rx done fail: {}", context));
        }
        if status.contains(IrqStatus::TX_DONE) {
            self.ports.indicator.fail(tx_done, &format!("IRQ tx done fail: {}", context));
        }

        self.faults += 1;
        self.link_state = LinkState::Receive;
        self.rx_status = [RxStatus::None; 2];
    }

    fn do_receive(&mut self, antenna: Antenna, do_clock_reset: bool) -> RxStatus {
        let idx = antenna.index();
        let mut buf = [0u8; FRAME_LEN];
        if let Some(radio) = self.radio_mut(antenna) {
            radio.read_buffer(0, &mut buf);
        }

        let rx_status = if self.bind.is_in_bind() {
            self.bind.do_receive(&buf)
        } else {
            let result = check_tx_frame(&buf, self.filter.sync_word());
            if result == Err(CheckError::SyncWord) {
                // the interrupt filter should have dropped it
                warn!("Sync word mismatch on {}", antenna);
                return RxStatus::Invalid;
            }
            tx_frame_rx_status(result)
        };

        if rx_status.is_valid() && do_clock_reset {
            self.clock.reset();
        }

        // signal readings are kept for bad frames too
        if let Some(radio) = self.radio_mut(antenna) {
            let packet = radio.packet_status();
            self.stats.set_packet_status(antenna, packet.rssi, packet.snr);
        }

        self.rx_buf[idx] = buf;
        rx_status
    }

    fn do_transmit(&mut self, antenna: Antenna) -> Result<()> {
        let frame = if self.bind.is_in_bind() {
            self.bind.do_transmit()?
        } else {
            self.stats.transmit_seq_no = self.stats.transmit_seq_no.wrapping_add(1);
            self.prepare_transmit_frame(antenna)?
        };

        let tmo = self.link.send_frame_tmo_ms;
        match (antenna, self.radio2.as_mut()) {
            (Antenna::A2, Some(radio2)) => {
                radio2.send_frame(&frame, tmo);
                self.radio1.set_to_idle();
            }
            (_, radio2) => {
                self.radio1.send_frame(&frame, tmo);
                if let Some(radio2) = radio2 {
                    radio2.set_to_idle();
                }
            }
        }
        Ok(())
    }

    fn prepare_transmit_frame(&mut self, antenna: Antenna) -> Result<[u8; FRAME_LEN]> {
        let (frame_type, payload) = match self.task.get() {
            LinkTask::None => {
                let mut payload = Vec::with_capacity(FRAME_RX_PAYLOAD_LEN);
                if self.connection.is_connected() {
                    while payload.len() < FRAME_RX_PAYLOAD_LEN {
                        match self.ports.serial.getc() {
                            Some(c) => payload.push(c),
                            None => break,
                        }
                    }
                    self.stats.bytes_transmitted.add(payload.len());
                    self.stats.serial_data_transmitted += 1;
                } else {
                    self.ports.serial.flush();
                }
                (FrameType::Normal, payload)
            }
            LinkTask::SendSetupData => (FrameType::Command, Command::SetupData(self.setup_data()).encode()),
        };

        self.stats.last_transmit_antenna = antenna;
        let frame_stats = FrameStats {
            seq_no: self.stats.transmit_seq_no,
            ack: true,
            antenna: self.stats.last_antenna,
            transmit_antenna: antenna,
            rssi: self.stats.get_last_rssi(),
            lq: self.rxstats.get_lq(),
            lq_serial_data: self.rxstats.get_lq_serial_data(),
        };

        pack_rx_frame(self.filter.sync_word(), frame_type, &frame_stats, &payload)
    }

    fn setup_data(&self) -> SetupData {
        SetupData {
            firmware_version: FIRMWARE_VERSION,
            device_id: self.config.rx.device_id,
            actual_power_dbm: self.radio1.rf_power_dbm(),
            params: self.config.rx_params(),
        }
    }

    fn handle_receive(&mut self, antenna: Antenna) {
        let rx_status = self.rx_status[antenna.index()];
        let buf = self.rx_buf[antenna.index()];

        if self.bind.is_in_bind() {
            self.bind.handle_receive(antenna, rx_status, &buf);
            return;
        }

        if rx_status.is_valid() {
            let do_payload = rx_status == RxStatus::Valid;
            self.process_received_frame(do_payload, &buf);

            self.rxstats.do_valid_crc1_frame_received();
            if do_payload {
                self.rxstats.do_valid_frame_received();
            }
        } else {
            self.stats.received_seq_no = SEQ_NO_NONE;
            self.stats.received_ack = false;
        }

        self.stats.last_antenna = antenna;
        self.rxstats.do_frame_received();
    }

    fn handle_receive_none(&mut self) {
        self.stats.received_seq_no = SEQ_NO_NONE;
        self.stats.received_ack = false;
    }

    fn process_received_frame(&mut self, do_payload: bool, buf: &[u8; FRAME_LEN]) {
        if !do_payload {
            // only the crc1 protected part can be trusted
            let rc1 = TxFrame::unpack_rc1(buf);
            self.rc.ch[..RC1_NUM_CHANNELS].copy_from_slice(&rc1);
            self.record_header(&decode_status(buf));
            return;
        }

        let frame = TxFrame::unpack(buf);
        self.record_header(&frame.status);
        self.rc = frame.rc;

        if frame.status.kind() == Some(FrameType::Command) {
            self.process_command(&frame.payload);
            return;
        }

        // a normal frame proves the transmitter has seen our response
        self.task.reset();

        if !self.connection.is_connected() {
            return;
        }
        self.ports.serial.write(&frame.payload);
        self.stats.bytes_received.add(frame.payload.len());
        if !frame.payload.is_empty() {
            self.stats.serial_data_received += 1;
            self.rxstats.do_serial_data_received();
        }
    }

    fn record_header(&mut self, status: &FrameStatus) {
        self.stats.received_seq_no = status.seq_no;
        self.stats.received_ack = status.ack;
        self.stats.received_antenna = status.antenna;
        self.stats.received_transmit_antenna = status.transmit_antenna;
        self.stats.received_rssi = status.rssi();
        self.stats.received_lq = status.lq;
        self.stats.received_lq_serial_data = status.lq_serial_data;
    }

    fn process_command(&mut self, payload: &[u8]) {
        match Command::decode(payload) {
            Some(Command::GetSetupData) => {
                debug!("Command: get setup data");
                self.task.set(LinkTask::SendSetupData);
            }
            Some(Command::SetParams(params)) => {
                debug!("Command: set params {:?}", params);
                self.config.apply_rx_params(&params);
                self.task.set(LinkTask::SendSetupData);
            }
            Some(Command::StoreParams) => {
                info!("Command: store params");
                self.params_store = true;
            }
            Some(Command::GetSetupDataWithReload) => {
                debug!("Command: get setup data with reload");
                match self.ports.store.reload() {
                    Ok(config) => self.config = config,
                    Err(e) => warn!("Setup reload failed: {}", e),
                }
                self.task.set(LinkTask::SendSetupData);
            }
            Some(Command::SetupData(_)) | None => {
                debug!("Ignoring unexpected command payload");
            }
        }
    }

    fn post_receive(&mut self) {
        let [rx1, rx2] = self.rx_status;
        let receive = self.link.receive_antenna;
        let crc1_counts_for_sync = self.link.crc1_counts_for_sync;
        let counts = |s: RxStatus| {
            if crc1_counts_for_sync {
                s.is_valid()
            } else {
                s == RxStatus::Valid
            }
        };

        let (frame_received, valid_frame_received) = match receive {
            AntennaMode::Diversity => (rx1.is_received() || rx2.is_received(), counts(rx1) || counts(rx2)),
            AntennaMode::Antenna2 => (rx2.is_received(), counts(rx2)),
            AntennaMode::Antenna1 => (rx1.is_received(), counts(rx1)),
        };
        let invalid_frame_received = frame_received && !valid_frame_received;

        if frame_received {
            let antenna = match receive {
                AntennaMode::Diversity => {
                    self.rdiversity
                        .antenna(rx1, rx2, self.stats.last_rssi[0], self.stats.last_rssi[1])
                }
                AntennaMode::Antenna2 => Antenna::A2,
                AntennaMode::Antenna1 => Antenna::A1,
            };
            self.handle_receive(antenna);
        } else {
            self.handle_receive_none();
        }

        match self.link.transmit_antenna {
            AntennaMode::Diversity => {
                self.tdiversity
                    .do_estimate(rx1, rx2, self.stats.last_rssi[0], self.stats.last_rssi[1])
            }
            AntennaMode::Antenna2 => self.tdiversity.set_antenna(Antenna::A2),
            AntennaMode::Antenna1 => self.tdiversity.set_antenna(Antenna::A1),
        }

        if !valid_frame_received {
            self.ports.output.frame_lost();
        }

        if valid_frame_received {
            self.connection.on_valid_frame();
            self.link_state = LinkState::Transmit;
        }

        // a listening receiver does not answer noise
        if self.connection.state() == ConnectionState::Listen && invalid_frame_received {
            self.link_state = LinkState::Receive;
        }

        if self.connection.state() == ConnectionState::Listen {
            if self.connection.listen_tick() {
                self.fhss.hop_to_next();
                self.link_state = LinkState::Receive;
            }
            if self.fhss.hop_to_next_bind() {
                self.link_state = LinkState::Receive;
            }
        }

        if self.connection.check_timeout() {
            self.stats.reset();
            self.link_state = LinkState::Receive;
        }

        // reply on the current channel even without a valid frame
        self.frame_missed = false;
        if self.connection.state() >= ConnectionState::Sync && !valid_frame_received {
            self.frame_missed = true;
            self.connection.on_frame_missed();
            self.link_state = LinkState::Transmit;
        }

        if self.connection.state() >= ConnectionState::Sync
            || matches!(self.link_state, LinkState::Receive | LinkState::Transmit)
        {
            self.for_each_radio(|radio| radio.set_to_idle());
        }

        self.tick_1hz_commensurate += 1;
        if self.tick_1hz_commensurate >= self.link.frame_rate_hz {
            self.tick_1hz_commensurate = 0;
            self.rxstats.update_1hz();
            self.stats.update_1hz();
        }
        self.rxstats.next();
        if !self.connection.is_connected() {
            self.rxstats.clear();
        }

        if self.connection.state() == ConnectionState::Listen {
            self.task.reset();
            self.task.set(LinkTask::SendSetupData);
        }

        if self.config.rx.buzzer == BuzzerMode::LostPackets
            && self.connection.occurred_once()
            && !self.bind.is_in_bind()
            && !valid_frame_received
        {
            self.ports.indicator.beep_lost_packet();
        }

        match self.bind.task() {
            BindTask::ChangedToBind => {
                self.bind.config_for_bind(&self.filter);
                self.clock.set_period(self.link.frame_rate_ms);
                self.clock.reset();
                self.fhss.set_to_bind(self.link.frame_rate_ms);
                self.leds.set(true, false);
                self.show_leds(true, false);
                self.connection.force_listen();
                self.link_state = LinkState::Receive;
            }
            BindTask::StoreParams => {
                let band = self.fhss.curr_frequency_band();
                self.config.fhss.band = band;
                self.config.fhss.num_channels = self.config.fhss.num_channels.min(band.channel_count() - 1);
                if let Some(phrase) = self.bind.received().and_then(|d| std::str::from_utf8(&d.bind_phrase).ok()) {
                    self.config.link.bind_phrase = phrase.to_string();
                }
                self.params_store = true;
            }
            BindTask::None => {}
        }

        self.post_receive2_cnt = POST_RECEIVE2_LOOPS;
    }

    fn post_receive2(&mut self) {
        if self.post_receive2_cnt == 0 {
            return;
        }
        self.post_receive2_cnt -= 1;
        if self.post_receive2_cnt > 0 {
            return;
        }

        if self.connection.is_connected() {
            let stats = self.link_statistics();
            self.ports.output.send_rc_data(
                &self.rc,
                self.frame_missed,
                false,
                self.stats.get_last_rssi(),
                self.rxstats.get_lq(),
            );
            self.ports.output.send_link_statistics(&stats);
        } else if self.connection.occurred_once() {
            // outputs stay silent until the first connection
            self.ports.output.send_rc_data(&self.rc, true, true, RSSI_MIN, 0);
            self.ports.output.send_link_statistics(&LinkStatistics::disconnected(
                self.link.frame_rate_hz,
                self.radio1.rf_power_dbm(),
            ));
        }
    }

    fn store_params(&mut self) -> Result<()> {
        self.params_store = false;
        self.for_each_radio(|radio| radio.set_to_idle());
        self.show_leds(true, true);

        let result = self.ports.store.store(&self.config);
        match &result {
            Ok(()) => info!("Parameters stored, restarting"),
            Err(e) => error!("Storing parameters failed: {}, restarting", e),
        }

        self.restart();
        self.start()?;
        result
    }

    /// Rebuild all link state from the current setup
    fn restart(&mut self) {
        self.link = self.config.resolve();
        self.filter.set_sync_word(self.link.sync_word);
        self.filter.set_bind(false);

        self.link_state = LinkState::Receive;
        self.connection = ConnectionTracker::new(
            self.link.connect_sync_cnt,
            self.link.connect_tmo_systicks,
            self.link.connect_listen_hop_cnt,
        );
        self.fhss = Fhss::new(self.link.fhss.clone());
        self.tdiversity = TxDiversity::new(self.link.frame_rate_ms);
        self.rxstats = RxStats::new(self.link.lq_averaging_period);
        self.stats.reset();
        self.bind = Bind::new(own_bind_data(&self.link), self.link.auto_bind_tmo_ms);
        self.task.reset();
        self.clock = FrameClock::new(self.link.frame_rate_ms);
        self.rx_status = [RxStatus::None; 2];
        self.frame_missed = false;
        self.tick_1hz_commensurate = 0;
        self.post_receive2_cnt = 0;
        self.restarts += 1;
    }

    fn show_leds(&mut self, green: bool, red: bool) {
        if self.shown_leds != Some((green, red)) {
            self.ports.indicator.set_leds(green, red);
            self.shown_leds = Some((green, red));
        }
    }

    fn radio_mut(&mut self, antenna: Antenna) -> Option<&mut R> {
        match antenna {
            Antenna::A1 => Some(&mut self.radio1),
            Antenna::A2 => self.radio2.as_mut(),
        }
    }

    fn for_each_radio(&mut self, mut f: impl FnMut(&mut R)) {
        f(&mut self.radio1);
        if let Some(radio2) = self.radio2.as_mut() {
            f(radio2);
        }
    }

    /// Snapshot for outputs and the stats logger
    pub fn link_statistics(&self) -> LinkStatistics {
        if !self.connection.is_connected() {
            return LinkStatistics::disconnected(self.link.frame_rate_hz, self.radio1.rf_power_dbm());
        }
        LinkStatistics {
            connected: true,
            rssi1: self.stats.last_rssi[0],
            rssi2: self.stats.last_rssi[1],
            lq: self.rxstats.get_lq(),
            lq_serial_data: self.rxstats.get_lq_serial_data(),
            snr: self.stats.get_last_snr(),
            antenna: self.stats.last_antenna.to_bit(),
            transmit_antenna: self.stats.last_transmit_antenna.to_bit(),
            frame_rate_hz: self.link.frame_rate_hz,
            tx_power_dbm: self.radio1.rf_power_dbm(),
            downlink_rssi: self.stats.received_rssi,
            downlink_lq: self.stats.received_lq,
            bytes_per_sec_transmitted: self.stats.bytes_transmitted.bytes_per_sec(),
            bytes_per_sec_received: self.stats.bytes_received.bytes_per_sec(),
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &ConnectionTracker {
        &self.connection
    }

    /// Receive outcome per antenna of the current cycle
    pub fn rx_status(&self) -> [RxStatus; 2] {
        self.rx_status
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn rxstats(&self) -> &RxStats {
        &self.rxstats
    }

    pub fn fhss(&self) -> &Fhss {
        &self.fhss
    }

    pub fn transmit_antenna(&self) -> Antenna {
        self.tdiversity.antenna()
    }

    pub fn task(&self) -> LinkTask {
        self.task.get()
    }

    /// Last received RC data
    pub fn rc_data(&self) -> &RcData {
        &self.rc
    }

    pub fn is_in_bind(&self) -> bool {
        self.bind.is_in_bind()
    }

    /// Setup record as currently applied
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn link_config(&self) -> &LinkConfig {
        &self.link
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Restarts after storing parameters
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Protocol faults seen so far
    pub fn faults(&self) -> u32 {
        self.faults
    }

    pub fn radio1(&self) -> &R {
        &self.radio1
    }

    pub fn radio2(&self) -> Option<&R> {
        self.radio2.as_ref()
    }
}

fn own_bind_data(link: &LinkConfig) -> RxBindData {
    RxBindData {
        firmware_version: FIRMWARE_VERSION,
        device_id: link.device_id,
    }
}
