//! # Air Frame Layout
//!
//! Every air frame has the same fixed length. Offsets below are byte offsets
//! into the frame buffer.
//!
//! ```text
//! Tx -> Rx:  | sync(2) | status(6) | rc1(6) | crc1(1) | rc2(17) | payload(57) | crc(2) |
//! Rx -> Tx:  | sync(2) | status(6) | payload(81)                              | crc(2) |
//! Bind:      | signature(8) | type/flags(1) | bind data ... zero fill         | crc(2) |
//! ```
//!
//! Status bytes:
//! - byte 2: seq_no (bits 0-2) | ack (bit 3) | frame type (bits 4-7)
//! - byte 3: receiving antenna (bit 0) | transmitting antenna (bit 1)
//! - byte 4: rssi as u7 (`-rssi`)
//! - byte 5: link quality in percent
//! - byte 6: serial link quality in percent
//! - byte 7: payload length

use crate::radio::Antenna;

/// Total length of every air frame
pub const FRAME_LEN: usize = 91;

/// Sync word + status bytes
pub const FRAME_HEADER_LEN: usize = 8;

/// CRC-16 trailer length
pub const FRAME_CRC_LEN: usize = 2;

/// Offset of the CRC-16 trailer
pub const FRAME_CRC_OFFSET: usize = FRAME_LEN - FRAME_CRC_LEN;

/// Offset of the first status byte (right after the sync word)
pub const FRAME_STATUS_OFFSET: usize = 2;

/// Tx frame: packed channels 1-4
pub const TX_RC1_OFFSET: usize = FRAME_HEADER_LEN;
/// Tx frame: length of the rc1 block (4 x 11 bits)
pub const TX_RC1_LEN: usize = 6;

/// Tx frame: offset of the crc1 byte protecting header + rc1
pub const TX_CRC1_OFFSET: usize = TX_RC1_OFFSET + TX_RC1_LEN;

/// Tx frame: packed channels 5-16
pub const TX_RC2_OFFSET: usize = TX_CRC1_OFFSET + 1;
/// Tx frame: length of the rc2 block (12 x 11 bits)
pub const TX_RC2_LEN: usize = 17;

/// Tx frame: payload offset
pub const TX_PAYLOAD_OFFSET: usize = TX_RC2_OFFSET + TX_RC2_LEN;
/// Tx frame: payload capacity
pub const FRAME_TX_PAYLOAD_LEN: usize = FRAME_CRC_OFFSET - TX_PAYLOAD_OFFSET;

/// Rx frame: payload offset
pub const RX_PAYLOAD_OFFSET: usize = FRAME_HEADER_LEN;
/// Rx frame: payload capacity
pub const FRAME_RX_PAYLOAD_LEN: usize = FRAME_CRC_OFFSET - RX_PAYLOAD_OFFSET;

/// Bind frame: signature length
pub const BIND_SIGNATURE_LEN: usize = 8;
/// Bind frame: offset of the type/flags byte
pub const BIND_FLAGS_OFFSET: usize = BIND_SIGNATURE_LEN;
/// Bind frame: offset of the bind data
pub const BIND_DATA_OFFSET: usize = BIND_FLAGS_OFFSET + 1;
/// Bind frame: flag set once the sender has heard its peer
pub const BIND_FLAG_CONNECTED: u8 = 0x10;

/// Signature of bind frames sent by the transmitter
pub const BIND_TX_SIGNATURE: u64 = 0x6F2D_A41C_97E3_5B08;
/// Signature of bind frames sent by the receiver
pub const BIND_RX_SIGNATURE: u64 = 0x19C7_3E5A_B20F_D864;

/// Weakest reportable RSSI in dBm
pub const RSSI_MIN: i8 = -127;

/// Sequence numbers use 3 header bits
pub const SEQ_NO_MASK: u8 = 0x07;

/// Frame type tag (4 header bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// RC data plus serial payload
    Normal = 1,
    /// Payload carries a command
    Command = 2,
    /// Bind frame (signature instead of sync word)
    Bind = 3,
}

impl FrameType {
    /// Parse a 4-bit type tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FrameType::Normal),
            2 => Some(FrameType::Command),
            3 => Some(FrameType::Bind),
            _ => None,
        }
    }
}

/// Link figures written into the header of every outgoing frame.
///
/// Sampled from stats and the link quality tracker at packing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub seq_no: u8,
    pub ack: bool,
    /// Antenna the last frame was received on
    pub antenna: Antenna,
    /// Antenna this frame is transmitted on
    pub transmit_antenna: Antenna,
    /// Last RSSI in dBm
    pub rssi: i8,
    pub lq: u8,
    pub lq_serial_data: u8,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            seq_no: 0,
            ack: false,
            antenna: Antenna::A1,
            transmit_antenna: Antenna::A1,
            rssi: RSSI_MIN,
            lq: 0,
            lq_serial_data: 0,
        }
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatus {
    pub seq_no: u8,
    pub ack: bool,
    /// Raw 4-bit type tag, see `FrameType::from_u8`
    pub frame_type: u8,
    pub antenna: Antenna,
    pub transmit_antenna: Antenna,
    pub rssi_u7: u8,
    pub lq: u8,
    pub lq_serial_data: u8,
    pub payload_len: u8,
}

impl FrameStatus {
    /// RSSI reported by the far end, in dBm
    pub fn rssi(&self) -> i8 {
        rssi_i8_from_u7(self.rssi_u7)
    }

    /// Typed frame tag, `None` for unknown tags
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }
}

/// Convert an RSSI in dBm to the 7-bit header representation
pub fn rssi_u7_from_i8(rssi: i8) -> u8 {
    if rssi >= 0 {
        0
    } else if rssi <= -127 {
        127
    } else {
        (-rssi) as u8
    }
}

/// Convert the 7-bit header representation back to dBm
pub fn rssi_i8_from_u7(rssi_u7: u8) -> i8 {
    -((rssi_u7 & 0x7F) as i8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_adds_up() {
        assert_eq!(FRAME_TX_PAYLOAD_LEN, 57);
        assert_eq!(FRAME_RX_PAYLOAD_LEN, 81);
        assert_eq!(TX_PAYLOAD_OFFSET + FRAME_TX_PAYLOAD_LEN + FRAME_CRC_LEN, FRAME_LEN);
        assert_eq!(RX_PAYLOAD_OFFSET + FRAME_RX_PAYLOAD_LEN + FRAME_CRC_LEN, FRAME_LEN);
    }

    #[test]
    fn test_rssi_conversion() {
        assert_eq!(rssi_u7_from_i8(-80), 80);
        assert_eq!(rssi_i8_from_u7(80), -80);
        assert_eq!(rssi_u7_from_i8(5), 0, "Positive RSSI clamps to 0");
        assert_eq!(rssi_u7_from_i8(i8::MIN), 127, "RSSI below -127 clamps");
        assert_eq!(rssi_i8_from_u7(0xFF), -127, "Only 7 bits are significant");
    }

    #[test]
    fn test_frame_type_tags() {
        assert_eq!(FrameType::from_u8(1), Some(FrameType::Normal));
        assert_eq!(FrameType::from_u8(2), Some(FrameType::Command));
        assert_eq!(FrameType::from_u8(3), Some(FrameType::Bind));
        assert_eq!(FrameType::from_u8(0), None);
        assert_eq!(FrameType::from_u8(15), None);
    }

    #[test]
    fn test_signatures_differ() {
        assert_ne!(BIND_TX_SIGNATURE, BIND_RX_SIGNATURE);
    }
}
