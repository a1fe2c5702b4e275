//! # Interrupt Handoff
//!
//! Interrupt handlers only classify a completion event and park its status
//! bits in an `IrqSlot`; all processing happens later in the main loop.
//!
//! Ownership rules:
//! - a slot is written only by its radio's interrupt handler (`raise`)
//! - a slot is cleared only by the main loop, after consuming it (`take`) or
//!   right before arming the next radio operation (`clear`)

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

use super::{IrqStatus, Transceiver};

/// Status bits handed from one radio's interrupt to the main loop.
#[derive(Debug, Default)]
pub struct IrqSlot(AtomicU16);

impl IrqSlot {
    /// Create an empty slot
    pub const fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    /// Interrupt side: add status bits
    pub fn raise(&self, status: IrqStatus) {
        self.0.fetch_or(status.bits(), Ordering::AcqRel);
    }

    /// Main loop side: consume all pending bits
    pub fn take(&self) -> IrqStatus {
        IrqStatus::from_bits(self.0.swap(0, Ordering::AcqRel))
    }

    /// Main loop side: look at pending bits without consuming them
    pub fn peek(&self) -> IrqStatus {
        IrqStatus::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Main loop side: drop stale bits before arming a new operation
    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Receive-done filter evaluated in interrupt context.
///
/// Holds the sync word expected in normal operation and the signature
/// expected while binding. Frames matching neither are dropped before the
/// main loop ever sees them.
#[derive(Debug)]
pub struct RxFilter {
    in_bind: AtomicBool,
    sync_word: AtomicU16,
    bind_signature: AtomicU64,
}

impl RxFilter {
    /// Create a filter for normal operation
    pub fn new(sync_word: u16, bind_signature: u64) -> Self {
        Self {
            in_bind: AtomicBool::new(false),
            sync_word: AtomicU16::new(sync_word),
            bind_signature: AtomicU64::new(bind_signature),
        }
    }

    /// Switch between normal and bind matching
    pub fn set_bind(&self, in_bind: bool) {
        self.in_bind.store(in_bind, Ordering::Release);
    }

    /// True while bind signatures are expected
    pub fn is_in_bind(&self) -> bool {
        self.in_bind.load(Ordering::Acquire)
    }

    /// Replace the expected sync word (after storing new parameters)
    pub fn set_sync_word(&self, sync_word: u16) {
        self.sync_word.store(sync_word, Ordering::Release);
    }

    /// Currently expected sync word
    pub fn sync_word(&self) -> u16 {
        self.sync_word.load(Ordering::Acquire)
    }

    /// Check the leading bytes of a received frame
    ///
    /// # Arguments
    ///
    /// * `head` - At least the first 8 bytes of the received frame
    pub fn accepts(&self, head: &[u8]) -> bool {
        if self.is_in_bind() {
            if head.len() < 8 {
                return false;
            }
            let mut sig = [0u8; 8];
            sig.copy_from_slice(&head[..8]);
            u64::from_le_bytes(sig) == self.bind_signature.load(Ordering::Acquire)
        } else {
            if head.len() < 2 {
                return false;
            }
            u16::from_le_bytes([head[0], head[1]]) == self.sync_word()
        }
    }
}

/// Body of a radio's DIO interrupt handler.
///
/// Reads and clears the chip's interrupt status; on receive-done, peeks at the
/// frame start and discards the event entirely if it is not addressed to us.
/// Never blocks and never touches scheduler state.
pub fn service_dio<R: Transceiver + ?Sized>(radio: &mut R, slot: &IrqSlot, filter: &RxFilter) {
    let mut status = radio.get_and_clear_irq_status(IrqStatus::ALL);

    if status.contains(IrqStatus::RX_DONE) {
        let mut head = [0u8; 8];
        let len = if filter.is_in_bind() { 8 } else { 2 };
        radio.read_buffer(0, &mut head[..len]);
        if !filter.accepts(&head[..len]) {
            status = IrqStatus::NONE;
        }
    }

    if !status.is_empty() {
        slot.raise(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::MockTransceiver;

    const SYNC: u16 = 0x4C7A;
    const SIG: u64 = 0x1122_3344_5566_7788;

    #[test]
    fn test_slot_take_clears() {
        let slot = IrqSlot::new();
        slot.raise(IrqStatus::RX_DONE);
        slot.raise(IrqStatus::TIMEOUT);
        assert_eq!(slot.peek(), IrqStatus::RX_DONE | IrqStatus::TIMEOUT);
        assert_eq!(slot.take(), IrqStatus::RX_DONE | IrqStatus::TIMEOUT);
        assert!(slot.take().is_empty(), "take() must consume the bits");
    }

    #[test]
    fn test_filter_normal_mode() {
        let filter = RxFilter::new(SYNC, SIG);
        assert!(filter.accepts(&SYNC.to_le_bytes()));
        assert!(!filter.accepts(&0x1234u16.to_le_bytes()));
        assert!(!filter.accepts(&[0x7A]));
    }

    #[test]
    fn test_filter_bind_mode() {
        let filter = RxFilter::new(SYNC, SIG);
        filter.set_bind(true);
        assert!(filter.accepts(&SIG.to_le_bytes()));
        assert!(!filter.accepts(&(SIG ^ 1).to_le_bytes()), "Wrong signature must be rejected in bind");
        assert!(!filter.accepts(&SYNC.to_le_bytes()), "Sync word is not a bind signature");
    }

    #[test]
    fn test_service_dio_drops_foreign_frames() {
        let filter = RxFilter::new(SYNC, SIG);
        let slot = IrqSlot::new();
        let mut radio = MockTransceiver::new();
        radio
            .expect_get_and_clear_irq_status()
            .returning(|_| IrqStatus::RX_DONE);
        radio
            .expect_read_buffer()
            .returning(|_, buf| buf.copy_from_slice(&0xBEEFu16.to_le_bytes()));

        service_dio(&mut radio, &slot, &filter);
        assert!(slot.peek().is_empty(), "Frame with foreign sync word must be discarded");
    }

    #[test]
    fn test_service_dio_accepts_own_frames() {
        let filter = RxFilter::new(SYNC, SIG);
        let slot = IrqSlot::new();
        let mut radio = MockTransceiver::new();
        radio
            .expect_get_and_clear_irq_status()
            .returning(|_| IrqStatus::RX_DONE);
        radio
            .expect_read_buffer()
            .returning(|_, buf| buf.copy_from_slice(&SYNC.to_le_bytes()));

        service_dio(&mut radio, &slot, &filter);
        assert_eq!(slot.peek(), IrqStatus::RX_DONE);
    }

    #[test]
    fn test_service_dio_passes_tx_done_untouched() {
        let filter = RxFilter::new(SYNC, SIG);
        let slot = IrqSlot::new();
        let mut radio = MockTransceiver::new();
        radio
            .expect_get_and_clear_irq_status()
            .returning(|_| IrqStatus::TX_DONE);

        service_dio(&mut radio, &slot, &filter);
        assert_eq!(slot.take(), IrqStatus::TX_DONE);
    }
}
