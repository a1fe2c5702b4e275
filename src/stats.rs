//! # Link Statistics
//!
//! Process-wide counters and last-seen values of the link, mutated on every
//! frame event and read by frame packing, outputs and the stats logger.

use crate::frame::protocol::RSSI_MIN;
use crate::radio::Antenna;

/// Received sequence number when nothing valid was received
pub const SEQ_NO_NONE: u8 = u8::MAX;

/// Byte counter with a per-second rate
#[derive(Debug, Default, Clone)]
pub struct ByteCounter {
    total: u64,
    cnt: u32,
    bytes_per_sec: u32,
}

impl ByteCounter {
    /// Count `n` bytes
    pub fn add(&mut self, n: usize) {
        self.total += n as u64;
        self.cnt += n as u32;
    }

    /// Commit the bytes counted during the last second
    pub fn update_1hz(&mut self) {
        self.bytes_per_sec = self.cnt;
        self.cnt = 0;
    }

    /// Rate committed by the last `update_1hz`
    pub fn bytes_per_sec(&self) -> u32 {
        self.bytes_per_sec
    }

    /// Bytes counted since the last reset
    pub fn total(&self) -> u64 {
        self.total
    }
}

#[derive(Debug, Clone)]
pub struct Stats {
    pub transmit_seq_no: u8,
    /// `SEQ_NO_NONE` if the last cycle had no valid frame
    pub received_seq_no: u8,
    pub received_ack: bool,

    /// Antenna of the last processed frame
    pub last_antenna: Antenna,
    pub last_transmit_antenna: Antenna,
    /// Last RSSI/SNR per antenna, updated even for bad frames
    pub last_rssi: [i8; 2],
    pub last_snr: [i8; 2],

    /// Values reported by the far end in its frame header
    pub received_antenna: Antenna,
    pub received_transmit_antenna: Antenna,
    pub received_rssi: i8,
    pub received_lq: u8,
    pub received_lq_serial_data: u8,

    pub bytes_transmitted: ByteCounter,
    pub bytes_received: ByteCounter,
    /// Normal frames sent while connected, each a serial data slot
    pub serial_data_transmitted: u32,
    /// Received frames that carried serial data
    pub serial_data_received: u32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            transmit_seq_no: 0,
            received_seq_no: SEQ_NO_NONE,
            received_ack: false,
            last_antenna: Antenna::A1,
            last_transmit_antenna: Antenna::A1,
            last_rssi: [RSSI_MIN; 2],
            last_snr: [0; 2],
            received_antenna: Antenna::A1,
            received_transmit_antenna: Antenna::A1,
            received_rssi: RSSI_MIN,
            received_lq: 0,
            received_lq_serial_data: 0,
            bytes_transmitted: ByteCounter::default(),
            bytes_received: ByteCounter::default(),
            serial_data_transmitted: 0,
            serial_data_received: 0,
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// RSSI of the antenna the last frame was processed from
    pub fn get_last_rssi(&self) -> i8 {
        self.last_rssi[self.last_antenna.index()]
    }

    /// SNR of the antenna the last frame was processed from
    pub fn get_last_snr(&self) -> i8 {
        self.last_snr[self.last_antenna.index()]
    }

    /// Record the signal readings of one antenna
    pub fn set_packet_status(&mut self, antenna: Antenna, rssi: i8, snr: i8) {
        self.last_rssi[antenna.index()] = rssi;
        self.last_snr[antenna.index()] = snr;
    }

    pub fn update_1hz(&mut self) {
        self.bytes_transmitted.update_1hz();
        self.bytes_received.update_1hz();
    }

    /// Back to power-on values
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_rate() {
        let mut counter = ByteCounter::default();
        counter.add(40);
        counter.add(17);
        assert_eq!(counter.bytes_per_sec(), 0, "Rate is committed at 1 Hz");

        counter.update_1hz();
        assert_eq!(counter.bytes_per_sec(), 57);
        counter.update_1hz();
        assert_eq!(counter.bytes_per_sec(), 0);
        assert_eq!(counter.total(), 57);
    }

    #[test]
    fn test_last_rssi_follows_antenna() {
        let mut stats = Stats::new();
        stats.set_packet_status(Antenna::A1, -80, 5);
        stats.set_packet_status(Antenna::A2, -60, 9);

        assert_eq!(stats.get_last_rssi(), -80);
        stats.last_antenna = Antenna::A2;
        assert_eq!(stats.get_last_rssi(), -60);
        assert_eq!(stats.get_last_snr(), 9);
    }

    #[test]
    fn test_reset() {
        let mut stats = Stats::new();
        stats.transmit_seq_no = 4;
        stats.received_seq_no = 2;
        stats.bytes_received.add(10);
        stats.reset();

        assert_eq!(stats.transmit_seq_no, 0);
        assert_eq!(stats.received_seq_no, SEQ_NO_NONE);
        assert_eq!(stats.bytes_received.total(), 0);
    }
}
