//! # CRSF Output
//!
//! Emits CRSF (Crossfire) RC-channels and link-statistics frames onto a
//! serial port, for flight controllers that take CRSF input.
//!
//! Frame structure:
//! ```text
//! | sync (0xC8) | length | type | payload ... | crc8 |
//! ```
//! `length` counts type + payload + crc, the CRC-8/DVB-S2 covers type and
//! payload.

use tracing::trace;

use super::{LinkOutput, LinkStatistics};
use crate::config::FailsafeMode;
use crate::frame::crc::crc8_dvb_s2;
use crate::frame::rc::{pack_channels, RcData, RC_CHANNEL_VALUE_MAX, RC_NUM_CHANNELS};
use crate::serial::SerialPort;

/// CRSF frame sync byte (flight controller address)
pub const CRSF_SYNC_BYTE: u8 = 0xC8;

/// RC Channels packet type
pub const CRSF_FRAMETYPE_RC_CHANNELS_PACKED: u8 = 0x16;

/// Link Statistics packet type
pub const CRSF_FRAMETYPE_LINK_STATISTICS: u8 = 0x14;

/// RC channels payload size (16 channels x 11 bits)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// Link Statistics payload size
pub const CRSF_LINK_STATS_PAYLOAD_SIZE: usize = 10;

/// CRSF channel value range (988 us to 2012 us)
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 172;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 1811;

/// Throttle position in AETR order
const THROTTLE_INDEX: usize = 2;

/// Scale an 11-bit link channel value to the CRSF range
pub fn rc_to_crsf(value: u16) -> u16 {
    let value = value.min(RC_CHANNEL_VALUE_MAX) as u32;
    let span = (CRSF_CHANNEL_VALUE_MAX - CRSF_CHANNEL_VALUE_MIN) as u32;
    CRSF_CHANNEL_VALUE_MIN + ((value * span + RC_CHANNEL_VALUE_MAX as u32 / 2) / RC_CHANNEL_VALUE_MAX as u32) as u16
}

/// Wrap a payload into a complete CRSF frame
///
/// # Arguments
///
/// * `frame_type` - CRSF frame type
/// * `payload` - Frame payload
///
/// # Returns
///
/// * `Vec<u8>` - sync + length + type + payload + crc
pub fn encode_frame(frame_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(CRSF_SYNC_BYTE);
    frame.push((payload.len() + 2) as u8);
    frame.push(frame_type);
    frame.extend_from_slice(payload);

    let crc = crc8_dvb_s2(&frame[2..]);
    frame.push(crc);

    frame
}

/// Encode RC channels into a complete CRSF frame
///
/// # Examples
///
/// ```
/// use hoplink::frame::rc::RcData;
/// use hoplink::out::crsf::encode_rc_channels_frame;
///
/// let frame = encode_rc_channels_frame(&RcData::default());
/// assert_eq!(frame.len(), 26);
/// ```
pub fn encode_rc_channels_frame(rc: &RcData) -> Vec<u8> {
    let mut channels = [0u16; RC_NUM_CHANNELS];
    for (out, &value) in channels.iter_mut().zip(rc.ch.iter()) {
        *out = rc_to_crsf(value);
    }

    let mut payload = [0u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE];
    pack_channels(&channels, &mut payload);
    encode_frame(CRSF_FRAMETYPE_RC_CHANNELS_PACKED, &payload)
}

/// Encode link statistics into a complete CRSF frame
pub fn encode_link_statistics_frame(stats: &LinkStatistics) -> Vec<u8> {
    let rssi = |dbm: i8| dbm.unsigned_abs();

    let payload: [u8; CRSF_LINK_STATS_PAYLOAD_SIZE] = [
        rssi(stats.rssi1),
        rssi(stats.rssi2),
        stats.lq,
        stats.snr as u8,
        stats.antenna,
        rf_mode(stats.frame_rate_hz),
        stats.tx_power_dbm.max(0) as u8,
        rssi(stats.downlink_rssi),
        stats.downlink_lq,
        0,
    ];
    encode_frame(CRSF_FRAMETYPE_LINK_STATISTICS, &payload)
}

/// CRSF rf mode index from the frame rate
fn rf_mode(frame_rate_hz: u16) -> u8 {
    match frame_rate_hz {
        0..=25 => 0,
        26..=50 => 1,
        51..=100 => 2,
        _ => 3,
    }
}

/// `LinkOutput` writing CRSF frames to a serial port
pub struct CrsfOutput<P: SerialPort> {
    port: P,
    failsafe_mode: FailsafeMode,
    frames_sent: u64,
}

impl<P: SerialPort> CrsfOutput<P> {
    pub fn new(port: P, failsafe_mode: FailsafeMode) -> Self {
        Self {
            port,
            failsafe_mode,
            frames_sent: 0,
        }
    }

    /// CRSF frames written so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    fn write(&mut self, frame: &[u8]) {
        self.port.write(frame);
        self.frames_sent += 1;
    }
}

impl<P: SerialPort> LinkOutput for CrsfOutput<P> {
    fn send_rc_data(&mut self, rc: &RcData, frame_missed: bool, failsafe: bool, _rssi: i8, _lq: u8) {
        if !failsafe {
            if frame_missed {
                trace!("CRSF: frame missed, repeating last channels");
            }
            let frame = encode_rc_channels_frame(rc);
            self.write(&frame);
            return;
        }

        let mut out = *rc;
        match self.failsafe_mode {
            FailsafeMode::NoSignal => return,
            FailsafeMode::LowThrottle => out.ch[THROTTLE_INDEX] = 0,
            FailsafeMode::AsConfigured => out = RcData::default(),
            FailsafeMode::LowThrottleElseCenter => {
                out = RcData::default();
                out.ch[THROTTLE_INDEX] = 0;
            }
        }
        let frame = encode_rc_channels_frame(&out);
        self.write(&frame);
    }

    fn send_link_statistics(&mut self, stats: &LinkStatistics) {
        let frame = encode_link_statistics_frame(stats);
        self.write(&frame);
    }
}
