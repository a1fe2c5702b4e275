//! # Simulated Air
//!
//! A shared medium advancing in 1 ms steps. A frame sent by one link end
//! is delivered when its airtime has elapsed, to every radio of the other
//! end that is receiving on the same carrier.
//!
//! Per-radio knobs model the channel: RSSI/SNR reported on delivery,
//! blocking (nothing arrives) and payload corruption (the trailer CRC
//! fails). Global loss and corruption percentages are rolled with a seeded
//! `WyRand`, so runs are reproducible.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand_core::{RngCore, SeedableRng};
use rand_wyrand::WyRand;
use tracing::trace;

use crate::frame::protocol::{FRAME_LEN, TX_PAYLOAD_OFFSET};
use crate::radio::{Antenna, IrqStatus, PacketStatus, RadioConfig, Transceiver};

/// Link end a radio belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The transmitter (ground) end
    Tx,
    /// The receiver end
    Rx,
}

impl Side {
    fn other(self) -> Self {
        match self {
            Side::Tx => Side::Rx,
            Side::Rx => Side::Tx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Rx,
    Tx,
}

#[derive(Debug)]
struct RadioState {
    mode: Mode,
    freq_hz: u32,
    irq: IrqStatus,
    rx_buf: [u8; FRAME_LEN],
    packet: PacketStatus,
    tx: Option<([u8; FRAME_LEN], u64)>,

    rssi: i8,
    snr: i8,
    blocked: bool,
    corrupt_payload: bool,
}

impl RadioState {
    fn new(rssi: i8, snr: i8) -> Self {
        Self {
            mode: Mode::Idle,
            freq_hz: 0,
            irq: IrqStatus::NONE,
            rx_buf: [0u8; FRAME_LEN],
            packet: PacketStatus { rssi, snr },
            tx: None,
            rssi,
            snr,
            blocked: false,
            corrupt_payload: false,
        }
    }
}

struct AirState {
    now_ms: u64,
    airtime_ms: u64,
    radios: Vec<((Side, Antenna), RadioState)>,
    rng: WyRand,
    loss_percent: u8,
    corrupt_percent: u8,
    delivered: u64,
    dropped: u64,
}

impl AirState {
    fn radio_mut(&mut self, side: Side, antenna: Antenna) -> Option<&mut RadioState> {
        self.radios
            .iter_mut()
            .find(|(key, _)| *key == (side, antenna))
            .map(|(_, radio)| radio)
    }
}

/// Handle to the shared medium, clones see the same air
#[derive(Clone)]
pub struct Air {
    state: Arc<Mutex<AirState>>,
}

impl fmt::Debug for Air {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Air")
            .field("now_ms", &state.now_ms)
            .field("radios", &state.radios.len())
            .field("delivered", &state.delivered)
            .finish_non_exhaustive()
    }
}

impl Air {
    /// Create an empty medium
    ///
    /// # Arguments
    ///
    /// * `airtime_ms` - Time on air of one frame
    /// * `seed` - Seed of the loss/corruption generator
    pub fn new(airtime_ms: u64, seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(AirState {
                now_ms: 0,
                airtime_ms: airtime_ms.max(1),
                radios: Vec::new(),
                rng: WyRand::seed_from_u64(seed),
                loss_percent: 0,
                corrupt_percent: 0,
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AirState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a radio at `side`/`antenna`
    ///
    /// # Arguments
    ///
    /// * `rssi` - RSSI in dBm reported for frames it receives
    /// * `snr` - SNR in dB reported for frames it receives
    pub fn radio(&self, side: Side, antenna: Antenna, rssi: i8, snr: i8) -> SimRadio {
        let mut state = self.lock();
        let fresh = RadioState::new(rssi, snr);
        match state.radio_mut(side, antenna) {
            Some(radio) => *radio = fresh,
            None => state.radios.push(((side, antenna), fresh)),
        }
        drop(state);
        SimRadio {
            air: self.clone(),
            side,
            antenna,
            alive: true,
            power_dbm: 0,
        }
    }

    /// Percentage of deliveries silently lost
    pub fn set_loss_percent(&self, percent: u8) {
        self.lock().loss_percent = percent.min(100);
    }

    /// Percentage of deliveries with a corrupted payload
    pub fn set_corrupt_percent(&self, percent: u8) {
        self.lock().corrupt_percent = percent.min(100);
    }

    pub fn set_rssi(&self, side: Side, antenna: Antenna, rssi: i8) {
        self.with_radio(side, antenna, |r| r.rssi = rssi);
    }

    /// Block all deliveries to one radio
    pub fn set_blocked(&self, side: Side, antenna: Antenna, blocked: bool) {
        self.with_radio(side, antenna, |r| r.blocked = blocked);
    }

    /// Corrupt the payload of every delivery to one radio
    pub fn set_corrupt_payload(&self, side: Side, antenna: Antenna, corrupt: bool) {
        self.with_radio(side, antenna, |r| r.corrupt_payload = corrupt);
    }

    fn with_radio(&self, side: Side, antenna: Antenna, f: impl FnOnce(&mut RadioState)) {
        if let Some(radio) = self.lock().radio_mut(side, antenna) {
            f(radio);
        }
    }

    /// Simulated time in ms
    pub fn now_ms(&self) -> u64 {
        self.lock().now_ms
    }

    /// Frames delivered to a radio so far
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    /// Frames lost to the loss percentage so far
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Pending interrupt bits of one radio, without clearing them
    pub fn pending_irq(&self, side: Side, antenna: Antenna) -> IrqStatus {
        self.lock()
            .radio_mut(side, antenna)
            .map_or(IrqStatus::NONE, |r| r.irq)
    }

    /// Advance by 1 ms, completing transmissions whose airtime has elapsed
    pub fn step(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.now_ms += 1;
        let now = state.now_ms;

        let mut done = Vec::new();
        for ((side, antenna), radio) in state.radios.iter_mut() {
            if let Some((frame, end)) = radio.tx {
                if end <= now {
                    radio.tx = None;
                    radio.mode = Mode::Idle;
                    radio.irq = radio.irq | IrqStatus::TX_DONE;
                    done.push((*side, *antenna, radio.freq_hz, frame));
                }
            }
        }

        for (side, antenna, freq_hz, frame) in done {
            trace!("Air: {:?}/{} sent on {} Hz", side, antenna, freq_hz);
            let receivers: Vec<(Side, Antenna)> = state
                .radios
                .iter()
                .filter(|((s, _), r)| *s == side.other() && r.mode == Mode::Rx && r.freq_hz == freq_hz && !r.blocked)
                .map(|(key, _)| *key)
                .collect();

            for key in receivers {
                let lost = roll(&mut state.rng, state.loss_percent);
                let corrupt = roll(&mut state.rng, state.corrupt_percent);
                let Some(radio) = state.radios.iter_mut().find(|(k, _)| *k == key).map(|(_, r)| r) else {
                    continue;
                };
                if lost {
                    state.dropped += 1;
                    continue;
                }

                radio.rx_buf = frame;
                if corrupt || radio.corrupt_payload {
                    radio.rx_buf[TX_PAYLOAD_OFFSET] ^= 0xA5;
                }
                radio.packet = PacketStatus {
                    rssi: radio.rssi,
                    snr: radio.snr,
                };
                radio.irq = radio.irq | IrqStatus::RX_DONE;
                radio.mode = Mode::Idle;
                state.delivered += 1;
            }
        }
    }
}

fn roll(rng: &mut WyRand, percent: u8) -> bool {
    percent > 0 && (rng.next_u32() % 100) < percent as u32
}

/// A transceiver living in the simulated air
#[derive(Debug)]
pub struct SimRadio {
    air: Air,
    side: Side,
    antenna: Antenna,
    alive: bool,
    power_dbm: i8,
}

impl SimRadio {
    /// Make the health check fail, as a radio that does not respond
    pub fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn antenna(&self) -> Antenna {
        self.antenna
    }

    /// Carrier the radio is tuned to
    pub fn freq_hz(&self) -> u32 {
        self.with_state(|r| r.freq_hz).unwrap_or(0)
    }

    /// True while armed for receive
    pub fn is_receiving(&self) -> bool {
        self.with_state(|r| r.mode == Mode::Rx).unwrap_or(false)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RadioState) -> T) -> Option<T> {
        self.air.lock().radio_mut(self.side, self.antenna).map(f)
    }
}

impl Transceiver for SimRadio {
    fn init(&mut self) {
        self.with_state(|r| {
            r.mode = Mode::Idle;
            r.irq = IrqStatus::NONE;
            r.tx = None;
        });
    }

    fn start_up(&mut self, config: &RadioConfig) {
        self.power_dbm = config.power_dbm;
    }

    fn is_ok(&self) -> bool {
        self.alive
    }

    fn set_rf_frequency(&mut self, freq_hz: u32) {
        self.with_state(|r| r.freq_hz = freq_hz);
    }

    fn set_to_rx(&mut self, _timeout_ms: u16) {
        self.with_state(|r| {
            r.tx = None;
            r.mode = Mode::Rx;
        });
    }

    fn send_frame(&mut self, data: &[u8], _timeout_ms: u16) {
        let mut frame = [0u8; FRAME_LEN];
        let n = data.len().min(FRAME_LEN);
        frame[..n].copy_from_slice(&data[..n]);

        let mut state = self.air.lock();
        let end = state.now_ms + state.airtime_ms;
        if let Some(radio) = state.radio_mut(self.side, self.antenna) {
            radio.mode = Mode::Tx;
            radio.tx = Some((frame, end));
        }
    }

    fn set_to_idle(&mut self) {
        self.with_state(|r| {
            r.mode = Mode::Idle;
            r.tx = None;
        });
    }

    fn get_and_clear_irq_status(&mut self, mask: IrqStatus) -> IrqStatus {
        self.with_state(|r| {
            let status = r.irq.masked(mask);
            r.irq = r.irq.without(mask);
            status
        })
        .unwrap_or(IrqStatus::NONE)
    }

    fn read_buffer(&mut self, offset: u8, buf: &mut [u8]) {
        self.with_state(|r| {
            let start = (offset as usize).min(FRAME_LEN);
            let n = buf.len().min(FRAME_LEN - start);
            buf[..n].copy_from_slice(&r.rx_buf[start..start + n]);
        });
    }

    fn packet_status(&mut self) -> PacketStatus {
        self.with_state(|r| r.packet).unwrap_or(PacketStatus { rssi: 0, snr: 0 })
    }

    fn rf_power_dbm(&self) -> i8 {
        self.power_dbm
    }
}
