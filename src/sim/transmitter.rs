//! # Simulated Transmitter
//!
//! The ground end of the link, reduced to what the receiver needs to see:
//! one frame per period on the next hop channel, RC data, serial bytes and
//! commands in the payload, and bind frames while binding. Replies are
//! checked and kept for inspection.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::bind::{TxBindData, BIND_PHRASE_LEN};
use crate::config::LinkConfig;
use crate::error::Result;
use crate::fhss::Fhss;
use crate::frame::command::{Command, SetupData};
use crate::frame::decoder::{check_bind_frame, check_rx_frame, RxFrame};
use crate::frame::encoder::{pack_bind_frame, pack_tx_frame};
use crate::frame::protocol::{
    FrameStats, FrameType, BIND_RX_SIGNATURE, BIND_TX_SIGNATURE, FRAME_LEN, FRAME_TX_PAYLOAD_LEN,
};
use crate::frame::rc::RcData;
use crate::radio::{Antenna, IrqStatus, Transceiver};

use super::air::SimRadio;

/// Transmitter side of the simulation
#[derive(Debug)]
pub struct SimTransmitter {
    radio: SimRadio,
    fhss: Fhss,
    sync_word: u16,
    period_ms: u16,
    send_frame_tmo_ms: u16,
    cnt_ms: u16,
    seq_no: u8,

    rc: RcData,
    serial_tx: VecDeque<u8>,
    serial_rx: Vec<u8>,
    pending_command: Option<Command>,
    bind_phrase: Option<[u8; BIND_PHRASE_LEN]>,
    heard_receiver: bool,

    frames_sent: u64,
    frames_received: u64,
    last_frame: Option<RxFrame>,
    setup_data: Option<SetupData>,
}

impl SimTransmitter {
    /// Create a transmitter running the link parameters `link`
    pub fn new(mut radio: SimRadio, link: &LinkConfig) -> Self {
        radio.init();
        radio.start_up(&link.radio);
        let mut fhss = Fhss::new(link.fhss.clone());
        fhss.start();

        Self {
            radio,
            fhss,
            sync_word: link.sync_word,
            period_ms: link.frame_rate_ms.max(1),
            send_frame_tmo_ms: link.send_frame_tmo_ms,
            cnt_ms: 0,
            seq_no: 0,
            rc: RcData::default(),
            serial_tx: VecDeque::new(),
            serial_rx: Vec::new(),
            pending_command: None,
            bind_phrase: None,
            heard_receiver: false,
            frames_sent: 0,
            frames_received: 0,
            last_frame: None,
            setup_data: None,
        }
    }

    /// RC data sent from the next frame on
    pub fn set_rc(&mut self, rc: RcData) {
        self.rc = rc;
    }

    /// Queue bytes for the serial passthrough
    pub fn write_serial(&mut self, data: &[u8]) {
        self.serial_tx.extend(data.iter().copied());
    }

    /// Take the serial bytes received from the receiver so far
    pub fn take_serial(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.serial_rx)
    }

    /// Send `command` in the next frame
    pub fn send_command(&mut self, command: Command) {
        self.pending_command = Some(command);
    }

    /// Start sending bind frames carrying `bind_phrase`
    pub fn start_bind(&mut self, bind_phrase: [u8; BIND_PHRASE_LEN], frame_rate_ms: u16) {
        self.bind_phrase = Some(bind_phrase);
        self.heard_receiver = false;
        self.fhss.set_to_bind(frame_rate_ms);
    }

    /// Leave bind and continue on the hop sequence of `link`
    pub fn stop_bind(&mut self, link: &LinkConfig) {
        self.bind_phrase = None;
        self.sync_word = link.sync_word;
        self.fhss = Fhss::new(link.fhss.clone());
        self.fhss.start();
    }

    /// A receiver bind frame was heard
    pub fn heard_receiver(&self) -> bool {
        self.heard_receiver
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Valid replies received
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Last valid reply
    pub fn last_frame(&self) -> Option<&RxFrame> {
        self.last_frame.as_ref()
    }

    /// Setup data of the last SetupData reply
    pub fn setup_data(&self) -> Option<&SetupData> {
        self.setup_data.as_ref()
    }

    pub fn fhss(&self) -> &Fhss {
        &self.fhss
    }

    /// Advance by 1 ms
    pub fn step(&mut self) {
        let status = self.radio.get_and_clear_irq_status(IrqStatus::ALL);
        if status.contains(IrqStatus::TX_DONE) {
            self.radio.set_to_rx(0);
        }
        if status.contains(IrqStatus::RX_DONE) {
            self.receive();
        }

        self.cnt_ms += 1;
        if self.cnt_ms >= self.period_ms {
            self.cnt_ms = 0;
            if let Err(e) = self.transmit() {
                warn!("Transmitter: {}", e);
            }
        }
    }

    fn receive(&mut self) {
        let mut buf = [0u8; FRAME_LEN];
        self.radio.read_buffer(0, &mut buf);

        if self.bind_phrase.is_some() {
            if check_bind_frame(&buf, BIND_RX_SIGNATURE).is_ok() {
                if !self.heard_receiver {
                    debug!("Transmitter: receiver bind frame heard");
                }
                self.heard_receiver = true;
            }
            return;
        }

        if check_rx_frame(&buf, self.sync_word).is_err() {
            return;
        }
        let frame = RxFrame::unpack(&buf);
        self.frames_received += 1;

        if frame.status.kind() == Some(FrameType::Command) {
            if let Some(Command::SetupData(data)) = Command::decode(&frame.payload) {
                debug!("Transmitter: setup data from device {}", data.device_id);
                self.setup_data = Some(data);
            }
        } else {
            self.serial_rx.extend_from_slice(&frame.payload);
        }
        self.last_frame = Some(frame);
    }

    fn transmit(&mut self) -> Result<()> {
        let frame = match self.bind_phrase {
            Some(bind_phrase) => {
                self.fhss.hop_to_next_bind();
                pack_bind_frame(BIND_TX_SIGNATURE, self.heard_receiver, &TxBindData { bind_phrase }.encode())?
            }
            None => {
                self.fhss.hop_to_next();
                self.seq_no = self.seq_no.wrapping_add(1);
                let (frame_type, payload) = match self.pending_command.take() {
                    Some(command) => (FrameType::Command, command.encode()),
                    None => {
                        let n = self.serial_tx.len().min(FRAME_TX_PAYLOAD_LEN);
                        (FrameType::Normal, self.serial_tx.drain(..n).collect())
                    }
                };
                let stats = FrameStats {
                    seq_no: self.seq_no,
                    ack: true,
                    antenna: Antenna::A1,
                    transmit_antenna: Antenna::A1,
                    ..FrameStats::default()
                };
                pack_tx_frame(self.sync_word, frame_type, &stats, &self.rc, &payload)?
            }
        };

        self.radio.set_rf_frequency(self.fhss.curr_freq());
        self.radio.send_frame(&frame, self.send_frame_tmo_ms);
        self.frames_sent += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::frame::decoder::{check_tx_frame, TxFrame};
    use crate::sim::air::{Air, Side};

    fn listener(air: &Air, freq: u32) -> SimRadio {
        let mut radio = air.radio(Side::Rx, Antenna::A1, -60, 5);
        radio.set_rf_frequency(freq);
        radio.set_to_rx(0);
        radio
    }

    #[test]
    fn test_sends_one_frame_per_period() {
        let link = Config::default().resolve();
        let air = Air::new(1, 1);
        let mut tx = SimTransmitter::new(air.radio(Side::Tx, Antenna::A1, -60, 5), &link);

        for _ in 0..(link.frame_rate_ms as usize * 5) {
            air.step();
            tx.step();
        }
        assert_eq!(tx.frames_sent(), 5);
        assert_eq!(tx.fhss().hop_count(), 5, "One hop per frame");
    }

    #[test]
    fn test_frames_carry_rc_and_serial() {
        let link = Config::default().resolve();
        let air = Air::new(1, 1);
        let mut tx = SimTransmitter::new(air.radio(Side::Tx, Antenna::A1, -60, 5), &link);

        let mut rc = RcData::default();
        rc.ch[5] = 1500;
        tx.set_rc(rc);
        tx.write_serial(b"hello");

        // the first frame goes out on the channel after the start channel
        let mut probe = Fhss::new(link.fhss.clone());
        probe.start();
        probe.hop_to_next();
        let mut rx = listener(&air, probe.curr_freq());

        for _ in 0..=link.frame_rate_ms {
            air.step();
            tx.step();
        }

        let mut buf = [0u8; FRAME_LEN];
        rx.read_buffer(0, &mut buf);
        assert!(check_tx_frame(&buf, link.sync_word).is_ok());
        let frame = TxFrame::unpack(&buf);
        assert_eq!(frame.rc.ch[5], 1500);
        assert_eq!(frame.payload, b"hello");
    }
}
