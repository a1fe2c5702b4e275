//! # Link Quality Tracker
//!
//! Per-cycle success flags kept in rings one averaging period long. The
//! engine marks the current slot as frames arrive, advances every cycle with
//! `next()` and commits the reported percentages once per second with
//! `update_1hz()`.

/// Ring of per-cycle success flags
#[derive(Debug, Clone)]
pub struct LqCounter {
    slots: Vec<bool>,
    pos: usize,
    cnt: usize,
}

impl LqCounter {
    /// Create a ring of `period` cycles (at least 1)
    pub fn new(period: usize) -> Self {
        Self {
            slots: vec![false; period.max(1)],
            pos: 0,
            cnt: 0,
        }
    }

    /// Mark the current cycle as a success. Repeated calls count once.
    pub fn set(&mut self) {
        if !self.slots[self.pos] {
            self.slots[self.pos] = true;
            self.cnt += 1;
        }
    }

    /// Move to the next cycle, forgetting the oldest one
    pub fn next(&mut self) {
        self.pos = (self.pos + 1) % self.slots.len();
        if self.slots[self.pos] {
            self.slots[self.pos] = false;
            self.cnt -= 1;
        }
    }

    /// Successes within the ring
    pub fn cnt(&self) -> usize {
        self.cnt
    }

    /// Successes in percent of the ring length
    pub fn lq(&self) -> u8 {
        (self.cnt * 100 / self.slots.len()) as u8
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = false);
        self.pos = 0;
        self.cnt = 0;
    }
}

/// Receive statistics of the receiver side
#[derive(Debug, Clone)]
pub struct RxStats {
    frames_received: LqCounter,
    valid_crc1_received: LqCounter,
    valid_frames_received: LqCounter,
    serial_data_received: LqCounter,

    lq: u8,
    lq_serial_data: u8,
}

impl RxStats {
    /// Create the tracker
    ///
    /// # Arguments
    ///
    /// * `period` - Averaging period in frames
    pub fn new(period: usize) -> Self {
        Self {
            frames_received: LqCounter::new(period),
            valid_crc1_received: LqCounter::new(period),
            valid_frames_received: LqCounter::new(period),
            serial_data_received: LqCounter::new(period),
            lq: 0,
            lq_serial_data: 0,
        }
    }

    /// Any frame was received this cycle
    pub fn do_frame_received(&mut self) {
        self.frames_received.set();
    }

    /// A frame with at least a valid header was received this cycle
    pub fn do_valid_crc1_frame_received(&mut self) {
        self.valid_crc1_received.set();
    }

    /// A fully valid frame was received this cycle
    pub fn do_valid_frame_received(&mut self) {
        self.valid_frames_received.set();
    }

    /// A fully valid frame carrying serial data was received this cycle
    pub fn do_serial_data_received(&mut self) {
        self.serial_data_received.set();
    }

    /// Advance all rings by one cycle
    pub fn next(&mut self) {
        self.frames_received.next();
        self.valid_crc1_received.next();
        self.valid_frames_received.next();
        self.serial_data_received.next();
    }

    /// Commit the current tallies to the reported percentages
    pub fn update_1hz(&mut self) {
        self.lq = self.valid_crc1_received.lq();
        self.lq_serial_data = self.serial_data_received.lq();
    }

    /// Reported link quality in percent
    pub fn get_lq(&self) -> u8 {
        self.lq
    }

    /// Reported serial link quality in percent
    pub fn get_lq_serial_data(&self) -> u8 {
        self.lq_serial_data
    }

    /// Live percentage of cycles with any frame
    pub fn frames_received_lq(&self) -> u8 {
        self.frames_received.lq()
    }

    /// Live percentage of cycles with a header-valid frame
    pub fn valid_crc1_received_lq(&self) -> u8 {
        self.valid_crc1_received.lq()
    }

    /// Live percentage of cycles with a fully valid frame
    pub fn valid_frames_received_lq(&self) -> u8 {
        self.valid_frames_received.lq()
    }

    /// Drop all history and reported values
    pub fn clear(&mut self) {
        self.frames_received.clear();
        self.valid_crc1_received.clear();
        self.valid_frames_received.clear();
        self.serial_data_received.clear();
        self.lq = 0;
        self.lq_serial_data = 0;
    }
}
