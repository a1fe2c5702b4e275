//! # Output Module
//!
//! Where the receiver delivers what came over the link: RC channel data,
//! link statistics and frame-lost notifications.
//!
//! This module handles:
//! - The `LinkOutput` trait consumed by the link engine
//! - The `LinkStatistics` snapshot shared by outputs and the stats logger
//! - CRSF output onto a serial port (`crsf`)

pub mod crsf;

use serde::Serialize;

use crate::frame::protocol::RSSI_MIN;
use crate::frame::rc::RcData;

/// Link statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStatistics {
    pub connected: bool,

    /// Last RSSI per antenna in dBm
    pub rssi1: i8,
    pub rssi2: i8,
    /// Link quality in percent
    pub lq: u8,
    pub lq_serial_data: u8,
    /// SNR in dB of the last processed frame
    pub snr: i8,
    /// Antenna of the last processed frame (0 or 1)
    pub antenna: u8,
    /// Antenna used for transmitting (0 or 1)
    pub transmit_antenna: u8,

    pub frame_rate_hz: u16,
    pub tx_power_dbm: i8,

    /// RSSI and link quality reported by the transmitter
    pub downlink_rssi: i8,
    pub downlink_lq: u8,

    pub bytes_per_sec_transmitted: u32,
    pub bytes_per_sec_received: u32,
}

impl LinkStatistics {
    /// Statistics reported while the link is down
    pub fn disconnected(frame_rate_hz: u16, tx_power_dbm: i8) -> Self {
        Self {
            connected: false,
            rssi1: RSSI_MIN,
            rssi2: RSSI_MIN,
            lq: 0,
            lq_serial_data: 0,
            snr: 0,
            antenna: 0,
            transmit_antenna: 0,
            frame_rate_hz,
            tx_power_dbm,
            downlink_rssi: RSSI_MIN,
            downlink_lq: 0,
            bytes_per_sec_transmitted: 0,
            bytes_per_sec_received: 0,
        }
    }
}

/// Sink of the receiver outputs
#[cfg_attr(test, mockall::automock)]
pub trait LinkOutput: Send {
    /// Deliver RC channel data
    ///
    /// # Arguments
    ///
    /// * `rc` - Channel values
    /// * `frame_missed` - No valid frame arrived in the last cycle
    /// * `failsafe` - Link is down, `rc` holds the last known values
    /// * `rssi` - RSSI in dBm
    /// * `lq` - Link quality in percent
    fn send_rc_data(&mut self, rc: &RcData, frame_missed: bool, failsafe: bool, rssi: i8, lq: u8);

    /// Deliver link statistics
    fn send_link_statistics(&mut self, stats: &LinkStatistics);

    /// A cycle passed without a valid frame
    fn frame_lost(&mut self) {}
}

/// Output that discards everything
#[derive(Debug, Default, Clone)]
pub struct NullOutput;

impl LinkOutput for NullOutput {
    fn send_rc_data(&mut self, _rc: &RcData, _frame_missed: bool, _failsafe: bool, _rssi: i8, _lq: u8) {}

    fn send_link_statistics(&mut self, _stats: &LinkStatistics) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_statistics() {
        let stats = LinkStatistics::disconnected(50, 10);
        assert!(!stats.connected);
        assert_eq!(stats.lq, 0);
        assert_eq!(stats.rssi1, RSSI_MIN);
        assert_eq!(stats.downlink_rssi, RSSI_MIN);
        assert_eq!(stats.frame_rate_hz, 50);
    }

    #[test]
    fn test_statistics_serialize() {
        let stats = LinkStatistics::disconnected(50, 10);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"connected\":false"));
        assert!(json.contains("\"rssi1\":-127"));
    }
}
