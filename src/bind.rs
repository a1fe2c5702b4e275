//! # Bind Sub-protocol
//!
//! While binding, receive and transmit handling is delegated here. Bind
//! frames carry a signature instead of the sync word:
//!
//! - the transmitter sends its bind phrase (`TxBindData`)
//! - the receiver answers with its identity (`RxBindData`) and sets the
//!   connected flag once it has heard the transmitter
//! - when the transmitter echoes the connected flag, the receiver stores the
//!   received bind phrase together with the current band and restarts
//!
//! Binding starts on request (`start_bind`) or automatically when no
//! connection has ever occurred within the auto bind timeout.

use tracing::{debug, info, warn};

use crate::config::is_bind_phrase_char;
use crate::error::Result;
use crate::frame::decoder::{check_bind_frame, rx_frame_rx_status, BindFrame};
use crate::frame::encoder::pack_bind_frame;
use crate::frame::protocol::{BIND_RX_SIGNATURE, BIND_TX_SIGNATURE, FRAME_LEN};
use crate::radio::irq::RxFilter;
use crate::radio::{Antenna, RxStatus};

/// Length of the bind phrase
pub const BIND_PHRASE_LEN: usize = 6;

/// Pending action for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindTask {
    None,
    /// Bind was just entered, the engine must switch sync word, hop pattern
    /// and frame clock
    ChangedToBind,
    /// Binding completed, the received parameters must be stored
    StoreParams,
}

/// Bind data sent by the transmitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxBindData {
    pub bind_phrase: [u8; BIND_PHRASE_LEN],
}

impl TxBindData {
    pub fn encode(&self) -> Vec<u8> {
        self.bind_phrase.to_vec()
    }

    /// Parse the transmitter bind data
    ///
    /// # Returns
    ///
    /// * `None` - Too short, or the phrase is not a usable bind phrase
    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut bind_phrase = [0u8; BIND_PHRASE_LEN];
        bind_phrase.copy_from_slice(data.get(..BIND_PHRASE_LEN)?);
        if !bind_phrase.iter().all(|&c| is_bind_phrase_char(char::from(c))) {
            return None;
        }
        Some(Self { bind_phrase })
    }
}

/// Bind data sent by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxBindData {
    pub firmware_version: u32,
    pub device_id: u16,
}

impl RxBindData {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6);
        out.extend_from_slice(&self.firmware_version.to_le_bytes());
        out.extend_from_slice(&self.device_id.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < 6 {
            return None;
        }
        Some(Self {
            firmware_version: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            device_id: u16::from_le_bytes([data[4], data[5]]),
        })
    }
}

/// Receiver side bind state machine
#[derive(Debug, Clone)]
pub struct Bind {
    in_bind: bool,
    task: BindTask,
    /// A transmitter bind frame was received
    is_connected: bool,
    store_requested: bool,
    received: Option<TxBindData>,
    own: RxBindData,

    auto_bind_tmo_ms: Option<u32>,
    auto_bind_cnt_ms: u32,
}

impl Bind {
    /// Create the state machine
    ///
    /// # Arguments
    ///
    /// * `own` - Identity reported in receiver bind frames
    /// * `auto_bind_tmo_ms` - Auto bind timeout, `None` disables auto bind
    pub fn new(own: RxBindData, auto_bind_tmo_ms: Option<u32>) -> Self {
        Self {
            in_bind: false,
            task: BindTask::None,
            is_connected: false,
            store_requested: false,
            received: None,
            own,
            auto_bind_tmo_ms,
            auto_bind_cnt_ms: 0,
        }
    }

    pub fn is_in_bind(&self) -> bool {
        self.in_bind
    }

    /// Enter bind mode (no-op if already binding)
    pub fn start_bind(&mut self) {
        if self.in_bind {
            return;
        }
        self.in_bind = true;
        self.is_connected = false;
        self.store_requested = false;
        self.received = None;
        self.task = BindTask::ChangedToBind;
        info!("Entering bind mode");
    }

    /// One systick without a connection ever having occurred
    pub fn auto_bind(&mut self) {
        let Some(tmo) = self.auto_bind_tmo_ms else {
            return;
        };
        if self.in_bind {
            return;
        }
        self.auto_bind_cnt_ms += 1;
        if self.auto_bind_cnt_ms >= tmo {
            info!("No connection within {} ms, auto bind", tmo);
            self.start_bind();
        }
    }

    /// Switch the receive filter to the transmitter bind signature
    pub fn config_for_bind(&self, filter: &RxFilter) {
        filter.set_bind(true);
    }

    /// Take the pending task
    pub fn task(&mut self) -> BindTask {
        std::mem::replace(&mut self.task, BindTask::None)
    }

    /// Validate a received bind frame
    ///
    /// # Returns
    ///
    /// * `RxStatus` - `Valid` or `Invalid`
    pub fn do_receive(&self, buf: &[u8]) -> RxStatus {
        rx_frame_rx_status(check_bind_frame(buf, BIND_TX_SIGNATURE))
    }

    /// Act on the frame selected by receive diversity
    pub fn handle_receive(&mut self, antenna: Antenna, rx_status: RxStatus, buf: &[u8; FRAME_LEN]) {
        if rx_status != RxStatus::Valid {
            return;
        }

        let frame = BindFrame::unpack(buf);
        let Some(data) = TxBindData::decode(&frame.data) else {
            warn!("Bind frame on {} with unusable bind phrase", antenna);
            return;
        };

        if !self.is_connected {
            debug!("Bind frame received on {}", antenna);
        }
        self.is_connected = true;
        self.received = Some(data);

        if frame.connected && !self.store_requested {
            self.store_requested = true;
            self.task = BindTask::StoreParams;
            info!("Bind completed");
        }
    }

    /// Build the receiver bind frame
    pub fn do_transmit(&self) -> Result<[u8; FRAME_LEN]> {
        pack_bind_frame(BIND_RX_SIGNATURE, self.is_connected, &self.own.encode())
    }

    /// A transmitter bind frame was received
    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// Bind data of the last received transmitter bind frame
    pub fn received(&self) -> Option<&TxBindData> {
        self.received.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: [u8; 6] = *b"mlrs.0";

    fn tx_bind_frame(connected: bool) -> [u8; FRAME_LEN] {
        pack_bind_frame(BIND_TX_SIGNATURE, connected, &TxBindData { bind_phrase: PHRASE }.encode()).unwrap()
    }

    fn bind() -> Bind {
        Bind::new(
            RxBindData {
                firmware_version: 0x000102,
                device_id: 7,
            },
            Some(100),
        )
    }

    #[test]
    fn test_start_bind_raises_task_once() {
        let mut bind = bind();
        assert!(!bind.is_in_bind());
        bind.start_bind();
        assert!(bind.is_in_bind());
        assert_eq!(bind.task(), BindTask::ChangedToBind);
        assert_eq!(bind.task(), BindTask::None, "task() consumes the task");

        bind.start_bind();
        assert_eq!(bind.task(), BindTask::None, "Re-entering bind is a no-op");
    }

    #[test]
    fn test_auto_bind_after_timeout() {
        let mut bind = bind();
        for _ in 0..99 {
            bind.auto_bind();
        }
        assert!(!bind.is_in_bind());
        bind.auto_bind();
        assert!(bind.is_in_bind());
    }

    #[test]
    fn test_auto_bind_disabled() {
        let mut bind = Bind::new(RxBindData::default(), None);
        for _ in 0..10_000 {
            bind.auto_bind();
        }
        assert!(!bind.is_in_bind());
    }

    #[test]
    fn test_bad_phrase_is_not_taken() {
        let mut bind = bind();
        bind.start_bind();
        bind.task();

        let frame = pack_bind_frame(BIND_TX_SIGNATURE, true, b"AB\x00 !z").unwrap();
        assert_eq!(bind.do_receive(&frame), RxStatus::Valid, "Frame itself is intact");
        bind.handle_receive(Antenna::A1, RxStatus::Valid, &frame);

        assert!(!bind.is_connected(), "Unusable phrase counts as not received");
        assert_eq!(bind.received(), None);
        assert_eq!(bind.task(), BindTask::None, "Nothing to store");
    }

    #[test]
    fn test_handshake_requests_store() {
        let mut bind = bind();
        bind.start_bind();
        bind.task();

        let first = tx_bind_frame(false);
        bind.handle_receive(Antenna::A1, bind.do_receive(&first), &first);
        assert!(bind.is_connected());
        assert_eq!(bind.task(), BindTask::None);
        assert_eq!(bind.received().map(|d| d.bind_phrase), Some(PHRASE));

        let reply = bind.do_transmit().unwrap();
        assert_eq!(check_bind_frame(&reply, BIND_RX_SIGNATURE), Ok(()));
        assert!(BindFrame::unpack(&reply).connected, "Reply carries the connected flag");

        let second = tx_bind_frame(true);
        bind.handle_receive(Antenna::A2, RxStatus::Valid, &second);
        assert_eq!(bind.task(), BindTask::StoreParams);

        bind.handle_receive(Antenna::A2, RxStatus::Valid, &second);
        assert_eq!(bind.task(), BindTask::None, "Store is requested once");
    }

    #[test]
    fn test_invalid_frame_is_ignored() {
        let mut bind = bind();
        bind.start_bind();
        let frame = tx_bind_frame(true);
        bind.handle_receive(Antenna::A1, RxStatus::Invalid, &frame);
        assert!(!bind.is_connected());
    }

    #[test]
    fn test_config_for_bind_switches_filter() {
        let filter = RxFilter::new(0x1234, BIND_TX_SIGNATURE);
        let mut bind = bind();
        bind.start_bind();
        assert!(!filter.is_in_bind());
        bind.config_for_bind(&filter);
        assert!(filter.is_in_bind());
        assert!(filter.accepts(&BIND_TX_SIGNATURE.to_le_bytes()));
    }

    #[test]
    fn test_rx_bind_data_layout() {
        let data = RxBindData {
            firmware_version: 0x0403_0201,
            device_id: 0x0605,
        };
        assert_eq!(data.encode(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(RxBindData::decode(&data.encode()), Some(data));
        assert_eq!(TxBindData::decode(&[1, 2]), None);
        assert_eq!(TxBindData::decode(b"mlrs.0").map(|d| d.bind_phrase), Some(PHRASE));
        assert_eq!(TxBindData::decode(b"MLRS.0"), None, "Upper case is not a bind phrase character");
    }
}
