//! # Frame Decoder
//!
//! Validates received air frames and unpacks them into owned values.
//!
//! Checks run in a fixed order and the first failure short-circuits:
//!
//! | Frame | Order |
//! |-------|-------|
//! | Tx -> Rx | size, crc1, sync word, type, payload length, crc16 |
//! | Rx -> Tx | size, crc16, sync word, type, payload length |
//! | Bind | size, crc16, signature, type |
//!
//! A Tx frame that passes every header check but fails the trailer CRC is
//! "header-only valid": its rc1 block may still be used.

use thiserror::Error;

use super::crc::{crc16, crc8_dvb_s2};
use super::encoder::BIND_DATA_MAX_LEN;
use super::protocol::*;
use super::rc::{unpack_channels, RcData, RC1_NUM_CHANNELS};
use crate::radio::{Antenna, RxStatus};

/// Reason a received frame failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CheckError {
    /// Buffer or declared payload length does not fit the frame kind
    #[error("frame size mismatch")]
    Size,

    /// crc1 over header + rc1 does not match
    #[error("header crc mismatch")]
    HeaderCrc,

    /// Sync word or bind signature does not match
    #[error("sync word mismatch")]
    SyncWord,

    /// Unknown frame type tag
    #[error("unknown frame type")]
    UnknownType,

    /// Trailer CRC does not match
    #[error("crc mismatch")]
    Crc,
}

/// Outcome of a frame check
pub type CheckResult = std::result::Result<(), CheckError>;

fn trailer_matches(buf: &[u8]) -> bool {
    let expected = u16::from_le_bytes([buf[FRAME_CRC_OFFSET], buf[FRAME_CRC_OFFSET + 1]]);
    crc16(&buf[..FRAME_CRC_OFFSET]) == expected
}

fn type_tag(buf: &[u8]) -> u8 {
    buf[FRAME_STATUS_OFFSET] >> 4
}

fn check_header(buf: &[u8], sync_word: u16, payload_capacity: usize) -> CheckResult {
    if u16::from_le_bytes([buf[0], buf[1]]) != sync_word {
        return Err(CheckError::SyncWord);
    }
    match FrameType::from_u8(type_tag(buf)) {
        Some(FrameType::Normal) | Some(FrameType::Command) => {}
        _ => return Err(CheckError::UnknownType),
    }
    if buf[7] as usize > payload_capacity {
        return Err(CheckError::Size);
    }
    Ok(())
}

/// Validate a transmitter-to-receiver frame
///
/// # Arguments
///
/// * `buf` - Received bytes
/// * `sync_word` - Expected session sync word
///
/// # Returns
///
/// * `Ok(())` - Fully valid
/// * `Err(CheckError::Crc)` - Header-only valid
/// * `Err(_)` - Invalid
pub fn check_tx_frame(buf: &[u8], sync_word: u16) -> CheckResult {
    if buf.len() != FRAME_LEN {
        return Err(CheckError::Size);
    }
    if crc8_dvb_s2(&buf[..TX_CRC1_OFFSET]) != buf[TX_CRC1_OFFSET] {
        return Err(CheckError::HeaderCrc);
    }
    check_header(buf, sync_word, FRAME_TX_PAYLOAD_LEN)?;
    if !trailer_matches(buf) {
        return Err(CheckError::Crc);
    }
    Ok(())
}

/// Validate a receiver-to-transmitter frame
pub fn check_rx_frame(buf: &[u8], sync_word: u16) -> CheckResult {
    if buf.len() != FRAME_LEN {
        return Err(CheckError::Size);
    }
    if !trailer_matches(buf) {
        return Err(CheckError::Crc);
    }
    check_header(buf, sync_word, FRAME_RX_PAYLOAD_LEN)
}

/// Validate a bind frame against the expected signature
pub fn check_bind_frame(buf: &[u8], signature: u64) -> CheckResult {
    if buf.len() != FRAME_LEN {
        return Err(CheckError::Size);
    }
    if !trailer_matches(buf) {
        return Err(CheckError::Crc);
    }
    let mut sig = [0u8; BIND_SIGNATURE_LEN];
    sig.copy_from_slice(&buf[..BIND_SIGNATURE_LEN]);
    if u64::from_le_bytes(sig) != signature {
        return Err(CheckError::SyncWord);
    }
    if FrameType::from_u8(buf[BIND_FLAGS_OFFSET] & 0x0F) != Some(FrameType::Bind) {
        return Err(CheckError::UnknownType);
    }
    Ok(())
}

/// Map a Tx frame check to the receive outcome used by diversity and stats
pub fn tx_frame_rx_status(result: CheckResult) -> RxStatus {
    match result {
        Ok(()) => RxStatus::Valid,
        Err(CheckError::Crc) => RxStatus::Crc1Valid,
        Err(_) => RxStatus::Invalid,
    }
}

/// Map an Rx frame or bind frame check to a receive outcome
pub fn rx_frame_rx_status(result: CheckResult) -> RxStatus {
    match result {
        Ok(()) => RxStatus::Valid,
        Err(_) => RxStatus::Invalid,
    }
}

/// Decode the status bytes of a frame that passed its header checks
pub fn decode_status(buf: &[u8; FRAME_LEN]) -> FrameStatus {
    let flags = buf[FRAME_STATUS_OFFSET];
    FrameStatus {
        seq_no: flags & SEQ_NO_MASK,
        ack: flags & 0x08 != 0,
        frame_type: flags >> 4,
        antenna: Antenna::from_bit(buf[3]),
        transmit_antenna: Antenna::from_bit(buf[3] >> 1),
        rssi_u7: buf[4],
        lq: buf[5],
        lq_serial_data: buf[6],
        payload_len: buf[7],
    }
}

/// Unpacked transmitter-to-receiver frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    pub status: FrameStatus,
    pub rc: RcData,
    pub payload: Vec<u8>,
}

impl TxFrame {
    /// Unpack a checked frame
    pub fn unpack(buf: &[u8; FRAME_LEN]) -> Self {
        let status = decode_status(buf);
        let mut rc = RcData::default();
        unpack_channels(&buf[TX_RC1_OFFSET..TX_RC1_OFFSET + TX_RC1_LEN], &mut rc.ch[..RC1_NUM_CHANNELS]);
        unpack_channels(&buf[TX_RC2_OFFSET..TX_RC2_OFFSET + TX_RC2_LEN], &mut rc.ch[RC1_NUM_CHANNELS..]);

        let len = (status.payload_len as usize).min(FRAME_TX_PAYLOAD_LEN);
        let payload = buf[TX_PAYLOAD_OFFSET..TX_PAYLOAD_OFFSET + len].to_vec();

        Self { status, rc, payload }
    }

    /// Channels 1-4 only, the part covered by crc1
    pub fn unpack_rc1(buf: &[u8; FRAME_LEN]) -> [u16; RC1_NUM_CHANNELS] {
        let mut ch = [0u16; RC1_NUM_CHANNELS];
        unpack_channels(&buf[TX_RC1_OFFSET..TX_RC1_OFFSET + TX_RC1_LEN], &mut ch);
        ch
    }
}

/// Unpacked receiver-to-transmitter frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub status: FrameStatus,
    pub payload: Vec<u8>,
}

impl RxFrame {
    /// Unpack a checked frame
    pub fn unpack(buf: &[u8; FRAME_LEN]) -> Self {
        let status = decode_status(buf);
        let len = (status.payload_len as usize).min(FRAME_RX_PAYLOAD_LEN);
        let payload = buf[RX_PAYLOAD_OFFSET..RX_PAYLOAD_OFFSET + len].to_vec();

        Self { status, payload }
    }
}

/// Unpacked bind frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindFrame {
    /// Sender has heard its peer
    pub connected: bool,
    /// Bind data block, zero filled to capacity
    pub data: Vec<u8>,
}

impl BindFrame {
    /// Unpack a checked frame
    pub fn unpack(buf: &[u8; FRAME_LEN]) -> Self {
        Self {
            connected: buf[BIND_FLAGS_OFFSET] & BIND_FLAG_CONNECTED != 0,
            data: buf[BIND_DATA_OFFSET..BIND_DATA_OFFSET + BIND_DATA_MAX_LEN].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encoder::{pack_bind_frame, pack_rx_frame, pack_tx_frame};

    const SYNC: u16 = 0x4C7A;

    fn tx_frame() -> [u8; FRAME_LEN] {
        let mut rc = RcData::default();
        rc.ch[0] = 172;
        rc.ch[3] = 1811;
        rc.ch[15] = 2000;
        let stats = FrameStats {
            seq_no: 3,
            ack: true,
            rssi: -70,
            lq: 99,
            ..FrameStats::default()
        };
        pack_tx_frame(SYNC, FrameType::Normal, &stats, &rc, b"hello").unwrap()
    }

    #[test]
    fn test_valid_tx_frame() {
        let frame = tx_frame();
        assert_eq!(check_tx_frame(&frame, SYNC), Ok(()));
        assert_eq!(tx_frame_rx_status(check_tx_frame(&frame, SYNC)), RxStatus::Valid);

        let decoded = TxFrame::unpack(&frame);
        assert_eq!(decoded.status.seq_no, 3);
        assert!(decoded.status.ack);
        assert_eq!(decoded.status.rssi(), -70);
        assert_eq!(decoded.status.kind(), Some(FrameType::Normal));
        assert_eq!(decoded.rc.ch[0], 172);
        assert_eq!(decoded.rc.ch[3], 1811);
        assert_eq!(decoded.rc.ch[15], 2000);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn test_trailer_bit_flips_fail_integrity() {
        let frame = tx_frame();

        for byte in FRAME_CRC_OFFSET..FRAME_LEN {
            for bit in 0..8 {
                let mut corrupted = frame;
                corrupted[byte] ^= 1 << bit;
                assert_eq!(
                    check_tx_frame(&corrupted, SYNC),
                    Err(CheckError::Crc),
                    "Flip of byte {} bit {} must fail the trailer check",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_payload_corruption_is_header_only_valid() {
        let mut frame = tx_frame();
        frame[TX_PAYLOAD_OFFSET] ^= 0xFF;

        let result = check_tx_frame(&frame, SYNC);
        assert_eq!(result, Err(CheckError::Crc));
        assert_eq!(tx_frame_rx_status(result), RxStatus::Crc1Valid);

        let rc1 = TxFrame::unpack_rc1(&frame);
        assert_eq!(rc1[0], 172, "rc1 survives payload corruption");
    }

    #[test]
    fn test_header_corruption_is_invalid() {
        let mut frame = tx_frame();
        frame[TX_RC1_OFFSET] ^= 0x01;

        let result = check_tx_frame(&frame, SYNC);
        assert_eq!(result, Err(CheckError::HeaderCrc));
        assert_eq!(tx_frame_rx_status(result), RxStatus::Invalid);
    }

    #[test]
    fn test_wrong_sync_word() {
        let frame = tx_frame();
        assert_eq!(check_tx_frame(&frame, SYNC ^ 0x0100), Err(CheckError::SyncWord));
    }

    #[test]
    fn test_wrong_size_is_not_a_crash() {
        let frame = tx_frame();
        assert_eq!(check_tx_frame(&frame[..FRAME_LEN - 1], SYNC), Err(CheckError::Size));
        assert_eq!(check_rx_frame(&[], SYNC), Err(CheckError::Size));
        assert_eq!(check_bind_frame(&frame[..10], BIND_TX_SIGNATURE), Err(CheckError::Size));
    }

    #[test]
    fn test_rx_frame_crc_failure_is_invalid() {
        let stats = FrameStats::default();
        let mut frame = pack_rx_frame(SYNC, FrameType::Command, &stats, &[5, 1, 2]).unwrap();
        assert_eq!(check_rx_frame(&frame, SYNC), Ok(()));

        let decoded = RxFrame::unpack(&frame);
        assert_eq!(decoded.status.kind(), Some(FrameType::Command));
        assert_eq!(decoded.payload, vec![5, 1, 2]);

        frame[20] ^= 0x10;
        let result = check_rx_frame(&frame, SYNC);
        assert_eq!(result, Err(CheckError::Crc));
        assert_eq!(rx_frame_rx_status(result), RxStatus::Invalid);
    }

    #[test]
    fn test_bind_frame_signature() {
        let frame = pack_bind_frame(BIND_TX_SIGNATURE, true, &[9, 8, 7]).unwrap();
        assert_eq!(check_bind_frame(&frame, BIND_TX_SIGNATURE), Ok(()));
        assert_eq!(check_bind_frame(&frame, BIND_RX_SIGNATURE), Err(CheckError::SyncWord));

        let decoded = BindFrame::unpack(&frame);
        assert!(decoded.connected);
        assert_eq!(&decoded.data[..3], &[9, 8, 7]);
        assert_eq!(decoded.data.len(), BIND_DATA_MAX_LEN);
    }

    #[test]
    fn test_bind_frame_is_not_a_normal_frame() {
        let frame = pack_bind_frame(BIND_TX_SIGNATURE, false, &[]).unwrap();
        assert!(check_tx_frame(&frame, SYNC).is_err());
    }
}
