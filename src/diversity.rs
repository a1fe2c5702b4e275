//! # Antenna Diversity
//!
//! Two independent decisions per cycle:
//!
//! - **Receive side**: which antenna's frame to process. The validity tier
//!   decides first, RSSI only breaks ties between equal tiers.
//! - **Transmit side**: which antenna to send the reply on. Each antenna
//!   keeps an exponentially averaged score; the choice moves to the other
//!   antenna only after it has been ahead by a margin for several cycles in
//!   a row, so one good or bad sample never flips it.

use tracing::debug;

use crate::frame::protocol::RSSI_MIN;
use crate::radio::{Antenna, RxStatus};

/// Score penalty of a header-only valid frame, in dB
const CRC1_PENALTY_DB: i32 = 6;

/// Fixed-point scale of the transmit scores
const SCORE_SCALE: i32 = 16;

/// EMA weight is `1 / 2^SCORE_SHIFT`
const SCORE_SHIFT: u32 = 3;

/// The other antenna must lead by this much, in dB
const SWITCH_MARGIN_DB: i32 = 3;

/// Time the other antenna must stay ahead before switching
const SWITCH_HOLD_MS: u16 = 100;

/// Lower bound of the switch persistence in cycles
const SWITCH_HOLD_MIN_CNT: u16 = 3;

/// Receive-side antenna selection
#[derive(Debug, Default, Clone)]
pub struct RxDiversity;

impl RxDiversity {
    /// Create the selector
    pub fn new() -> Self {
        Self
    }

    /// Pick the antenna whose frame should be processed
    ///
    /// # Arguments
    ///
    /// * `rx1`, `rx2` - Receive outcome per antenna
    /// * `rssi1`, `rssi2` - Last RSSI per antenna in dBm
    pub fn antenna(&self, rx1: RxStatus, rx2: RxStatus, rssi1: i8, rssi2: i8) -> Antenna {
        if rx1 != rx2 {
            return if rx1 > rx2 { Antenna::A1 } else { Antenna::A2 };
        }
        if rssi2 > rssi1 {
            Antenna::A2
        } else {
            Antenna::A1
        }
    }
}

/// Transmit-side antenna estimate
#[derive(Debug, Clone)]
pub struct TxDiversity {
    antenna: Antenna,
    /// Averaged score per antenna, dBm * `SCORE_SCALE`
    score: [i32; 2],
    ahead_cnt: u16,
    hold_cnt: u16,
}

impl TxDiversity {
    /// Create the estimator
    ///
    /// # Arguments
    ///
    /// * `frame_rate_ms` - Frame period, sets the switch persistence
    pub fn new(frame_rate_ms: u16) -> Self {
        let hold_cnt = (SWITCH_HOLD_MS / frame_rate_ms.max(1)).max(SWITCH_HOLD_MIN_CNT);

        Self {
            antenna: Antenna::A1,
            score: [RSSI_MIN as i32 * SCORE_SCALE; 2],
            ahead_cnt: 0,
            hold_cnt,
        }
    }

    /// Cycles the other antenna must lead before a switch
    pub fn hold_cnt(&self) -> u16 {
        self.hold_cnt
    }

    /// Fold one cycle of receive evidence into the estimate
    pub fn do_estimate(&mut self, rx1: RxStatus, rx2: RxStatus, rssi1: i8, rssi2: i8) {
        update_score(&mut self.score[0], sample_db(rx1, rssi1));
        update_score(&mut self.score[1], sample_db(rx2, rssi2));

        let curr = self.score[self.antenna.index()];
        let other = self.score[self.antenna.other().index()];

        if other > curr + SWITCH_MARGIN_DB * SCORE_SCALE {
            self.ahead_cnt += 1;
        } else {
            self.ahead_cnt = 0;
        }

        if self.ahead_cnt >= self.hold_cnt {
            self.antenna = self.antenna.other();
            self.ahead_cnt = 0;
            debug!("Transmit antenna switched to {}", self.antenna);
        }
    }

    /// Antenna for the next transmission
    pub fn antenna(&self) -> Antenna {
        self.antenna
    }

    /// Force the transmit antenna (single-antenna configurations)
    pub fn set_antenna(&mut self, antenna: Antenna) {
        self.antenna = antenna;
        self.ahead_cnt = 0;
    }
}

fn sample_db(status: RxStatus, rssi: i8) -> i32 {
    match status {
        RxStatus::Valid => rssi as i32,
        RxStatus::Crc1Valid => (rssi as i32 - CRC1_PENALTY_DB).max(RSSI_MIN as i32),
        RxStatus::Invalid | RxStatus::None => RSSI_MIN as i32,
    }
}

fn update_score(score: &mut i32, sample_db: i32) {
    let target = sample_db * SCORE_SCALE;
    *score += (target - *score) >> SCORE_SHIFT;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIERS: [RxStatus; 4] = [RxStatus::None, RxStatus::Invalid, RxStatus::Crc1Valid, RxStatus::Valid];

    #[test]
    fn test_tier_dominates_rssi() {
        let div = RxDiversity::new();
        assert_eq!(
            div.antenna(RxStatus::Crc1Valid, RxStatus::Valid, -80, -95),
            Antenna::A2,
            "A fully valid frame beats a stronger header-only one"
        );
        assert_eq!(div.antenna(RxStatus::Valid, RxStatus::Invalid, -110, -40), Antenna::A1);
    }

    #[test]
    fn test_equal_tiers_use_rssi() {
        let div = RxDiversity::new();
        assert_eq!(div.antenna(RxStatus::Valid, RxStatus::Valid, -90, -70), Antenna::A2);
        assert_eq!(div.antenna(RxStatus::Valid, RxStatus::Valid, -60, -70), Antenna::A1);
        assert_eq!(div.antenna(RxStatus::Valid, RxStatus::Valid, -60, -60), Antenna::A1, "Ties go to antenna 1");
    }

    #[test]
    fn test_never_prefers_none() {
        let div = RxDiversity::new();
        for &tier in TIERS.iter().filter(|t| t.is_received()) {
            for &(r1, r2) in &[(-127i8, 0i8), (0, -127), (-80, -80)] {
                assert_eq!(div.antenna(RxStatus::None, tier, r1, r2), Antenna::A2, "{:?} vs none", tier);
                assert_eq!(div.antenna(tier, RxStatus::None, r1, r2), Antenna::A1, "{:?} vs none", tier);
            }
        }
    }

    #[test]
    fn test_hold_cnt_from_frame_rate() {
        assert_eq!(TxDiversity::new(20).hold_cnt(), 5);
        assert_eq!(TxDiversity::new(50).hold_cnt(), 3, "Persistence never drops below 3 cycles");
        assert_eq!(TxDiversity::new(7).hold_cnt(), 14);
    }

    #[test]
    fn test_single_sample_does_not_flip() {
        let mut div = TxDiversity::new(20);
        for _ in 0..50 {
            div.do_estimate(RxStatus::Valid, RxStatus::Valid, -70, -72);
        }
        assert_eq!(div.antenna(), Antenna::A1);

        div.do_estimate(RxStatus::None, RxStatus::Valid, -70, -40);
        assert_eq!(div.antenna(), Antenna::A1, "One sample must not switch");
    }

    #[test]
    fn test_switches_on_persistent_advantage() {
        let mut div = TxDiversity::new(20);
        for _ in 0..200 {
            div.do_estimate(RxStatus::Valid, RxStatus::Valid, -100, -60);
        }
        assert_eq!(div.antenna(), Antenna::A2);
    }

    #[test]
    fn test_stable_under_constant_rssi() {
        let mut div = TxDiversity::new(20);
        let mut flips = 0;
        let mut last = div.antenna();

        for i in 0..500 {
            div.do_estimate(RxStatus::Valid, RxStatus::Valid, -85, -75);
            if div.antenna() != last {
                flips += 1;
                last = div.antenna();
                assert!(i < 100, "Switch must happen early, not at cycle {}", i);
            }
        }
        assert_eq!(flips, 1);
        assert_eq!(div.antenna(), Antenna::A2);
    }

    #[test]
    fn test_set_antenna() {
        let mut div = TxDiversity::new(20);
        div.set_antenna(Antenna::A2);
        assert_eq!(div.antenna(), Antenna::A2);
    }
}
