//! # Frame Encoder
//!
//! Packs header fields, RC data and payload into fixed-length air frames and
//! appends the integrity fields.

use super::crc::{crc16, crc8_dvb_s2};
use super::protocol::*;
use super::rc::{pack_channels, RcData};
use crate::error::{LinkError, Result};

/// Bind frame: capacity of the bind data block
pub const BIND_DATA_MAX_LEN: usize = FRAME_CRC_OFFSET - BIND_DATA_OFFSET;

fn write_header(buf: &mut [u8; FRAME_LEN], sync_word: u16, frame_type: FrameType, stats: &FrameStats, payload_len: usize) {
    buf[0..2].copy_from_slice(&sync_word.to_le_bytes());
    buf[2] = (stats.seq_no & SEQ_NO_MASK) | ((stats.ack as u8) << 3) | ((frame_type as u8) << 4);
    buf[3] = stats.antenna.to_bit() | (stats.transmit_antenna.to_bit() << 1);
    buf[4] = rssi_u7_from_i8(stats.rssi);
    buf[5] = stats.lq;
    buf[6] = stats.lq_serial_data;
    buf[7] = payload_len as u8;
}

fn write_crc(buf: &mut [u8; FRAME_LEN]) {
    let crc = crc16(&buf[..FRAME_CRC_OFFSET]);
    buf[FRAME_CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
}

/// Pack a transmitter-to-receiver frame
///
/// # Arguments
///
/// * `sync_word` - Session sync word
/// * `frame_type` - `Normal` or `Command`
/// * `stats` - Header link figures, sampled right before packing
/// * `rc` - RC channel values
/// * `payload` - Serial or command payload
///
/// # Errors
///
/// Returns error if the payload exceeds `FRAME_TX_PAYLOAD_LEN`
pub fn pack_tx_frame(
    sync_word: u16,
    frame_type: FrameType,
    stats: &FrameStats,
    rc: &RcData,
    payload: &[u8],
) -> Result<[u8; FRAME_LEN]> {
    if payload.len() > FRAME_TX_PAYLOAD_LEN {
        return Err(LinkError::Frame(format!(
            "Tx payload size {} exceeds maximum {}",
            payload.len(),
            FRAME_TX_PAYLOAD_LEN
        )));
    }

    let mut buf = [0u8; FRAME_LEN];
    write_header(&mut buf, sync_word, frame_type, stats, payload.len());

    pack_channels(rc.rc1(), &mut buf[TX_RC1_OFFSET..TX_RC1_OFFSET + TX_RC1_LEN]);
    buf[TX_CRC1_OFFSET] = crc8_dvb_s2(&buf[..TX_CRC1_OFFSET]);
    pack_channels(rc.rc2(), &mut buf[TX_RC2_OFFSET..TX_RC2_OFFSET + TX_RC2_LEN]);

    buf[TX_PAYLOAD_OFFSET..TX_PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
    write_crc(&mut buf);

    Ok(buf)
}

/// Pack a receiver-to-transmitter frame
///
/// # Errors
///
/// Returns error if the payload exceeds `FRAME_RX_PAYLOAD_LEN`
pub fn pack_rx_frame(sync_word: u16, frame_type: FrameType, stats: &FrameStats, payload: &[u8]) -> Result<[u8; FRAME_LEN]> {
    if payload.len() > FRAME_RX_PAYLOAD_LEN {
        return Err(LinkError::Frame(format!(
            "Rx payload size {} exceeds maximum {}",
            payload.len(),
            FRAME_RX_PAYLOAD_LEN
        )));
    }

    let mut buf = [0u8; FRAME_LEN];
    write_header(&mut buf, sync_word, frame_type, stats, payload.len());
    buf[RX_PAYLOAD_OFFSET..RX_PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
    write_crc(&mut buf);

    Ok(buf)
}

/// Pack a bind frame
///
/// # Arguments
///
/// * `signature` - `BIND_TX_SIGNATURE` or `BIND_RX_SIGNATURE`
/// * `connected` - Sender has already heard its peer
/// * `data` - Bind data block
///
/// # Errors
///
/// Returns error if `data` exceeds `BIND_DATA_MAX_LEN`
pub fn pack_bind_frame(signature: u64, connected: bool, data: &[u8]) -> Result<[u8; FRAME_LEN]> {
    if data.len() > BIND_DATA_MAX_LEN {
        return Err(LinkError::Frame(format!(
            "Bind data size {} exceeds maximum {}",
            data.len(),
            BIND_DATA_MAX_LEN
        )));
    }

    let mut buf = [0u8; FRAME_LEN];
    buf[..BIND_SIGNATURE_LEN].copy_from_slice(&signature.to_le_bytes());
    buf[BIND_FLAGS_OFFSET] = FrameType::Bind as u8 | if connected { BIND_FLAG_CONNECTED } else { 0 };
    buf[BIND_DATA_OFFSET..BIND_DATA_OFFSET + data.len()].copy_from_slice(data);
    write_crc(&mut buf);

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::Antenna;

    const SYNC: u16 = 0x4C7A;

    fn stats() -> FrameStats {
        FrameStats {
            seq_no: 5,
            ack: true,
            antenna: Antenna::A2,
            transmit_antenna: Antenna::A1,
            rssi: -92,
            lq: 87,
            lq_serial_data: 64,
        }
    }

    #[test]
    fn test_tx_header_fields() {
        let frame = pack_tx_frame(SYNC, FrameType::Normal, &stats(), &RcData::default(), b"abc").unwrap();

        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(&frame[0..2], &SYNC.to_le_bytes());
        assert_eq!(frame[2] & 0x07, 5, "seq_no");
        assert_eq!(frame[2] & 0x08, 0x08, "ack");
        assert_eq!(frame[2] >> 4, FrameType::Normal as u8);
        assert_eq!(frame[3], 0x01, "received on antenna 2, sent on antenna 1");
        assert_eq!(frame[4], 92);
        assert_eq!(frame[5], 87);
        assert_eq!(frame[6], 64);
        assert_eq!(frame[7], 3);
        assert_eq!(&frame[TX_PAYLOAD_OFFSET..TX_PAYLOAD_OFFSET + 3], b"abc");
    }

    #[test]
    fn test_tx_integrity_fields() {
        let frame = pack_tx_frame(SYNC, FrameType::Normal, &stats(), &RcData::default(), &[]).unwrap();

        assert_eq!(frame[TX_CRC1_OFFSET], crc8_dvb_s2(&frame[..TX_CRC1_OFFSET]));
        let crc = u16::from_le_bytes([frame[FRAME_CRC_OFFSET], frame[FRAME_CRC_OFFSET + 1]]);
        assert_eq!(crc, crc16(&frame[..FRAME_CRC_OFFSET]));
    }

    #[test]
    fn test_seq_no_wraps_into_three_bits() {
        let mut s = stats();
        s.seq_no = 13;
        let frame = pack_tx_frame(SYNC, FrameType::Normal, &s, &RcData::default(), &[]).unwrap();
        assert_eq!(frame[2] & 0x07, 5);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = [0u8; FRAME_TX_PAYLOAD_LEN + 1];
        assert!(pack_tx_frame(SYNC, FrameType::Normal, &stats(), &RcData::default(), &payload).is_err());

        let payload = [0u8; FRAME_RX_PAYLOAD_LEN + 1];
        assert!(pack_rx_frame(SYNC, FrameType::Normal, &stats(), &payload).is_err());

        let payload = [0u8; FRAME_RX_PAYLOAD_LEN];
        assert!(pack_rx_frame(SYNC, FrameType::Normal, &stats(), &payload).is_ok());
    }

    #[test]
    fn test_bind_frame_layout() {
        let frame = pack_bind_frame(BIND_RX_SIGNATURE, true, &[1, 2, 3]).unwrap();
        assert_eq!(&frame[..8], &BIND_RX_SIGNATURE.to_le_bytes());
        assert_eq!(frame[BIND_FLAGS_OFFSET] & 0x0F, FrameType::Bind as u8);
        assert_ne!(frame[BIND_FLAGS_OFFSET] & BIND_FLAG_CONNECTED, 0);
        assert_eq!(&frame[BIND_DATA_OFFSET..BIND_DATA_OFFSET + 3], &[1, 2, 3]);

        let oversized = [0u8; BIND_DATA_MAX_LEN + 1];
        assert!(pack_bind_frame(BIND_TX_SIGNATURE, false, &oversized).is_err());
    }
}
