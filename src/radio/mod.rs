//! # Radio Module
//!
//! The transceiver port abstraction consumed by the link engine.
//!
//! This module handles:
//! - The `Transceiver` trait every physical radio driver implements
//! - IRQ status bits and the interrupt-to-mainloop handoff slots
//! - Per-antenna receive outcomes used by antenna diversity

pub mod irq;

use std::fmt;

/// Antenna (and thus transceiver) selector.
///
/// Antenna 1 is always wired to the primary radio, antenna 2 to the second
/// radio when the board carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Antenna {
    /// Primary radio
    A1,
    /// Secondary radio
    A2,
}

impl Antenna {
    /// Index into per-antenna arrays (0 or 1)
    pub fn index(self) -> usize {
        match self {
            Antenna::A1 => 0,
            Antenna::A2 => 1,
        }
    }

    /// The other antenna
    pub fn other(self) -> Self {
        match self {
            Antenna::A1 => Antenna::A2,
            Antenna::A2 => Antenna::A1,
        }
    }

    /// Wire representation (single header bit)
    pub fn to_bit(self) -> u8 {
        self.index() as u8
    }

    /// Parse from the single header bit
    pub fn from_bit(bit: u8) -> Self {
        if bit & 0x01 == 0 {
            Antenna::A1
        } else {
            Antenna::A2
        }
    }
}

impl fmt::Display for Antenna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Antenna::A1 => write!(f, "antenna 1"),
            Antenna::A2 => write!(f, "antenna 2"),
        }
    }
}

/// Interrupt status bits reported by a transceiver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IrqStatus(u16);

impl IrqStatus {
    /// No interrupt pending
    pub const NONE: IrqStatus = IrqStatus(0);
    /// Transmission finished
    pub const TX_DONE: IrqStatus = IrqStatus(1 << 0);
    /// A packet has been received
    pub const RX_DONE: IrqStatus = IrqStatus(1 << 1);
    /// The radio's own operation timeout expired
    pub const TIMEOUT: IrqStatus = IrqStatus(1 << 9);
    /// All bits the link engine cares about
    pub const ALL: IrqStatus = IrqStatus(Self::TX_DONE.0 | Self::RX_DONE.0 | Self::TIMEOUT.0);

    /// Build from raw register bits
    pub const fn from_bits(bits: u16) -> Self {
        IrqStatus(bits)
    }

    /// Raw register bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// True if no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any bit of `other` is set
    pub const fn contains(self, other: IrqStatus) -> bool {
        self.0 & other.0 != 0
    }

    /// Return `self` with the bits of `other` removed
    pub const fn without(self, other: IrqStatus) -> Self {
        IrqStatus(self.0 & !other.0)
    }

    /// Return `self` restricted to the bits of `mask`
    pub const fn masked(self, mask: IrqStatus) -> Self {
        IrqStatus(self.0 & mask.0)
    }
}

impl std::ops::BitOr for IrqStatus {
    type Output = IrqStatus;

    fn bitor(self, rhs: IrqStatus) -> IrqStatus {
        IrqStatus(self.0 | rhs.0)
    }
}

impl fmt::Display for IrqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Signal readings of the last received packet
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacketStatus {
    /// RSSI in dBm
    pub rssi: i8,
    /// SNR in dB
    pub snr: i8,
}

/// Outcome of one receive attempt on one antenna.
///
/// Ordered by trust: `None < Invalid < Crc1Valid < Valid`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RxStatus {
    /// Nothing received this cycle
    #[default]
    None,
    /// Something was received but failed validation
    Invalid,
    /// Header (crc1) is valid, payload is not trustworthy
    Crc1Valid,
    /// Whole frame is valid
    Valid,
}

impl RxStatus {
    /// A frame of any quality was received
    pub fn is_received(self) -> bool {
        self > RxStatus::None
    }

    /// At least the header of a frame was valid
    pub fn is_valid(self) -> bool {
        self > RxStatus::Invalid
    }
}

impl fmt::Display for RxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RxStatus::None => "none",
            RxStatus::Invalid => "invalid",
            RxStatus::Crc1Valid => "crc1",
            RxStatus::Valid => "valid",
        };
        write!(f, "{}", s)
    }
}

/// Static radio setup handed to `Transceiver::start_up`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfig {
    /// Requested output power in dBm
    pub power_dbm: i8,
    /// Air frame length in bytes
    pub frame_len: u8,
}

/// One physical radio as seen by the link engine.
///
/// The engine drives two instances symmetrically; only antenna diversity
/// tells them apart. Methods mirror the operations of an SX12xx-class
/// transceiver and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait Transceiver {
    /// Power-on initialisation of the driver
    fn init(&mut self);

    /// Configure modem, packet and power settings
    fn start_up(&mut self, config: &RadioConfig);

    /// Health check, false if the chip does not respond
    fn is_ok(&self) -> bool;

    /// Retune the carrier
    fn set_rf_frequency(&mut self, freq_hz: u32);

    /// Arm for receive. A timeout of 0 means single receive without timeout.
    fn set_to_rx(&mut self, timeout_ms: u16);

    /// Transmit `data`, the radio raises TIMEOUT if not done within `timeout_ms`
    fn send_frame(&mut self, data: &[u8], timeout_ms: u16);

    /// Stop any operation
    fn set_to_idle(&mut self);

    /// Read and clear the interrupt bits selected by `mask`
    fn get_and_clear_irq_status(&mut self, mask: IrqStatus) -> IrqStatus;

    /// Read received bytes starting at `offset` into `buf`
    fn read_buffer(&mut self, offset: u8, buf: &mut [u8]);

    /// RSSI/SNR of the last received packet
    fn packet_status(&mut self) -> PacketStatus;

    /// Actual output power in dBm
    fn rf_power_dbm(&self) -> i8;

    /// Frequency error correction after a good packet
    fn handle_afc(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_antenna_bits_roundtrip() {
        assert_eq!(Antenna::from_bit(Antenna::A1.to_bit()), Antenna::A1);
        assert_eq!(Antenna::from_bit(Antenna::A2.to_bit()), Antenna::A2);
        assert_eq!(Antenna::A1.other(), Antenna::A2);
    }

    #[test]
    fn test_irq_status_bits() {
        let status = IrqStatus::RX_DONE | IrqStatus::TIMEOUT;
        assert!(status.contains(IrqStatus::RX_DONE));
        assert!(!status.contains(IrqStatus::TX_DONE));
        assert_eq!(status.without(IrqStatus::RX_DONE), IrqStatus::TIMEOUT);
        assert!(IrqStatus::NONE.is_empty());
        assert_eq!(status.to_string(), "0x0202");
    }

    #[test]
    fn test_rx_status_ordering() {
        assert!(RxStatus::Valid > RxStatus::Crc1Valid);
        assert!(RxStatus::Crc1Valid > RxStatus::Invalid);
        assert!(RxStatus::Invalid > RxStatus::None);
        assert!(RxStatus::Crc1Valid.is_valid());
        assert!(!RxStatus::Invalid.is_valid());
        assert!(RxStatus::Invalid.is_received());
        assert!(!RxStatus::None.is_received());
    }
}
