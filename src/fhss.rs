//! # Frequency Hopping Sequencer
//!
//! Both link ends derive the same hop sequence from the shared seed, so the
//! order never goes over the air.
//!
//! The sequence is a pseudo-random selection of distinct channels from the
//! band's channel plan, shuffled with a 31-bit LCG (`a = 214013`,
//! `c = 2531011`, `m = 2^31`). The band's bind channel is never part of the
//! normal sequence.
//!
//! While binding, the sequencer parks on the bind channel and, if several
//! bind bands are configured, dwells on each of them in turn.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How long the bind pattern stays on one band
pub const BIND_BAND_DWELL_MS: u32 = 2500;

/// Supported channel plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyBand {
    /// 2.4 GHz ISM, 80 channels at 1 MHz spacing
    Ism2400,
    /// 915 MHz FCC, 50 channels at 500 kHz spacing
    Fcc915,
    /// 868 MHz EU, 13 channels at 500 kHz spacing
    Eu868,
}

impl FrequencyBand {
    /// Number of channels in the plan
    pub fn channel_count(self) -> u8 {
        match self {
            FrequencyBand::Ism2400 => 80,
            FrequencyBand::Fcc915 => 50,
            FrequencyBand::Eu868 => 13,
        }
    }

    /// Carrier of channel `ch` in Hz
    pub fn channel_freq_hz(self, ch: u8) -> u32 {
        let (base, spacing) = match self {
            FrequencyBand::Ism2400 => (2_400_400_000, 1_000_000),
            FrequencyBand::Fcc915 => (902_750_000, 500_000),
            FrequencyBand::Eu868 => (863_275_000, 500_000),
        };
        base + spacing * ch as u32
    }

    /// Channel reserved for binding
    pub fn bind_channel(self) -> u8 {
        self.channel_count() / 2
    }

    /// Persisted representation
    pub fn to_u8(self) -> u8 {
        match self {
            FrequencyBand::Ism2400 => 0,
            FrequencyBand::Fcc915 => 1,
            FrequencyBand::Eu868 => 2,
        }
    }

    /// Parse the persisted representation
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FrequencyBand::Ism2400),
            1 => Some(FrequencyBand::Fcc915),
            2 => Some(FrequencyBand::Eu868),
            _ => None,
        }
    }
}

/// Session parameters of the sequencer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FhssConfig {
    /// Band used in normal operation
    pub band: FrequencyBand,
    /// Shared seed, derived from the bind phrase
    pub seed: u32,
    /// Length of the hop sequence
    pub num_channels: u8,
    /// Bands scanned while binding
    pub bind_bands: Vec<FrequencyBand>,
}

/// 31-bit linear congruential generator shared by both link ends
#[derive(Debug, Clone)]
struct Lcg {
    state: u32,
}

impl Lcg {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next value in `0..max`
    fn next_below(&mut self, max: u32) -> u32 {
        self.state = self.state.wrapping_mul(214_013).wrapping_add(2_531_011) & 0x7FFF_FFFF;
        (self.state >> 16) % max
    }
}

/// Channel hopping state
#[derive(Debug, Clone)]
pub struct Fhss {
    config: FhssConfig,
    /// Hop sequence as channel numbers
    sequence: Vec<u8>,
    curr_i: usize,
    hop_count: u32,

    in_bind: bool,
    bind_band_i: usize,
    bind_dwell: u32,
    bind_cnt: u32,
}

impl Fhss {
    /// Generate the hop sequence for `config`
    pub fn new(config: FhssConfig) -> Self {
        let sequence = generate_sequence(config.band, config.seed, config.num_channels);

        Self {
            config,
            sequence,
            curr_i: 0,
            hop_count: 0,
            in_bind: false,
            bind_band_i: 0,
            bind_dwell: 1,
            bind_cnt: 0,
        }
    }

    /// Reset to the start of the sequence
    pub fn start(&mut self) {
        self.curr_i = 0;
        self.hop_count = 0;
    }

    /// Advance one step, wrapping at the sequence end.
    ///
    /// No-op while binding, the bind channel is fixed.
    pub fn hop_to_next(&mut self) {
        if self.in_bind || self.sequence.is_empty() {
            return;
        }
        self.curr_i = (self.curr_i + 1) % self.sequence.len();
        self.hop_count = self.hop_count.wrapping_add(1);
    }

    /// Current carrier in Hz
    pub fn curr_freq(&self) -> u32 {
        let band = self.curr_frequency_band();
        if self.in_bind {
            return band.channel_freq_hz(band.bind_channel());
        }
        match self.sequence.get(self.curr_i) {
            Some(&ch) => band.channel_freq_hz(ch),
            None => band.channel_freq_hz(band.bind_channel()),
        }
    }

    /// Position in the hop sequence
    pub fn curr_index(&self) -> usize {
        self.curr_i
    }

    /// Hops done since `start()`
    pub fn hop_count(&self) -> u32 {
        self.hop_count
    }

    /// The hop sequence as channel numbers
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Number of channels in the sequence
    pub fn cnt(&self) -> usize {
        self.sequence.len()
    }

    /// Switch to the bind pattern
    ///
    /// # Arguments
    ///
    /// * `frame_rate_ms` - Frame period, sets how many calls of
    ///   `hop_to_next_bind` a bind band is kept
    pub fn set_to_bind(&mut self, frame_rate_ms: u16) {
        self.in_bind = true;
        self.bind_band_i = 0;
        self.bind_cnt = 0;
        self.bind_dwell = (BIND_BAND_DWELL_MS / frame_rate_ms.max(1) as u32).max(1);

        debug!(
            "FHSS set to bind on {:?} ({} bind bands)",
            self.curr_frequency_band(),
            self.config.bind_bands.len().max(1)
        );
    }

    /// True while the bind pattern is active
    pub fn is_in_bind(&self) -> bool {
        self.in_bind
    }

    /// Advance the bind pattern by one frame period
    ///
    /// # Returns
    ///
    /// * `bool` - true exactly when the bind band changed
    pub fn hop_to_next_bind(&mut self) -> bool {
        if !self.in_bind || self.config.bind_bands.len() < 2 {
            return false;
        }

        self.bind_cnt += 1;
        if self.bind_cnt < self.bind_dwell {
            return false;
        }

        self.bind_cnt = 0;
        self.bind_band_i = (self.bind_band_i + 1) % self.config.bind_bands.len();
        debug!("FHSS bind band {:?}", self.curr_frequency_band());
        true
    }

    /// Band currently in use (the bind band while binding)
    pub fn curr_frequency_band(&self) -> FrequencyBand {
        if self.in_bind {
            if let Some(&band) = self.config.bind_bands.get(self.bind_band_i) {
                return band;
            }
        }
        self.config.band
    }
}

/// Pick `num_channels` distinct channels of `band` in seeded random order
fn generate_sequence(band: FrequencyBand, seed: u32, num_channels: u8) -> Vec<u8> {
    let bind_ch = band.bind_channel();
    let mut pool: Vec<u8> = (0..band.channel_count()).filter(|&ch| ch != bind_ch).collect();
    let mut rng = Lcg::new(seed);

    // partial Fisher-Yates: the first n entries end up as the sequence
    let n = (num_channels as usize).min(pool.len());
    for i in 0..n {
        let remaining = (pool.len() - i) as u32;
        let j = i + rng.next_below(remaining) as usize;
        pool.swap(i, j);
    }

    pool.truncate(n);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u32) -> FhssConfig {
        FhssConfig {
            band: FrequencyBand::Ism2400,
            seed,
            num_channels: 24,
            bind_bands: vec![FrequencyBand::Ism2400],
        }
    }

    fn hop_freqs(fhss: &mut Fhss, n: usize) -> Vec<u32> {
        let mut freqs = Vec::with_capacity(n);
        for _ in 0..n {
            fhss.hop_to_next();
            freqs.push(fhss.curr_freq());
        }
        freqs
    }

    #[test]
    fn test_two_instances_hop_identically() {
        let mut a = Fhss::new(config(0x1234_5678));
        let mut b = Fhss::new(config(0x1234_5678));
        a.start();
        b.start();

        assert_eq!(a.curr_freq(), b.curr_freq());
        assert_eq!(hop_freqs(&mut a, 100), hop_freqs(&mut b, 100), "Same config must give same hops");
    }

    #[test]
    fn test_seed_changes_sequence() {
        let a = Fhss::new(config(1));
        let b = Fhss::new(config(2));
        assert_ne!(a.sequence(), b.sequence());
    }

    #[test]
    fn test_sequence_is_distinct_and_excludes_bind_channel() {
        let fhss = Fhss::new(config(42));
        let seq = fhss.sequence();
        assert_eq!(seq.len(), 24);

        let mut sorted = seq.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 24, "Channels must not repeat");
        assert!(!seq.contains(&FrequencyBand::Ism2400.bind_channel()));
        assert!(seq.iter().all(|&ch| ch < 80));
    }

    #[test]
    fn test_hop_wraps_at_sequence_end() {
        let mut fhss = Fhss::new(FhssConfig {
            num_channels: 10,
            ..config(7)
        });
        fhss.start();
        let first = fhss.curr_freq();

        for _ in 0..10 {
            fhss.hop_to_next();
        }
        assert_eq!(fhss.curr_index(), 0);
        assert_eq!(fhss.curr_freq(), first);
        assert_eq!(fhss.hop_count(), 10);
    }

    #[test]
    fn test_start_restarts_sequence() {
        let mut fhss = Fhss::new(config(99));
        fhss.start();
        let first = hop_freqs(&mut fhss, 5);
        fhss.start();
        assert_eq!(hop_freqs(&mut fhss, 5), first);
    }

    #[test]
    fn test_small_band_clamps_channel_count() {
        let fhss = Fhss::new(FhssConfig {
            band: FrequencyBand::Eu868,
            seed: 3,
            num_channels: 40,
            bind_bands: vec![],
        });
        assert_eq!(fhss.cnt(), 12, "13 channels minus the bind channel");
    }

    #[test]
    fn test_bind_parks_on_bind_channel() {
        let mut fhss = Fhss::new(config(5));
        fhss.start();
        fhss.set_to_bind(20);

        let band = FrequencyBand::Ism2400;
        let bind_freq = band.channel_freq_hz(band.bind_channel());
        assert_eq!(fhss.curr_freq(), bind_freq);
        fhss.hop_to_next();
        assert_eq!(fhss.curr_freq(), bind_freq, "Bind channel is fixed");
        assert!(!fhss.hop_to_next_bind(), "A single bind band never changes");
    }

    #[test]
    fn test_bind_band_change_is_signalled() {
        let mut fhss = Fhss::new(FhssConfig {
            bind_bands: vec![FrequencyBand::Fcc915, FrequencyBand::Eu868],
            ..config(5)
        });
        fhss.set_to_bind(50);
        assert_eq!(fhss.curr_frequency_band(), FrequencyBand::Fcc915);

        let dwell = BIND_BAND_DWELL_MS / 50;
        let changes: Vec<u32> = (1..=2 * dwell).filter(|_| fhss.hop_to_next_bind()).collect();
        assert_eq!(changes, vec![dwell, 2 * dwell]);
        assert_eq!(fhss.curr_frequency_band(), FrequencyBand::Fcc915);
    }

    #[test]
    fn test_hop_to_next_bind_outside_bind() {
        let mut fhss = Fhss::new(FhssConfig {
            bind_bands: vec![FrequencyBand::Fcc915, FrequencyBand::Eu868],
            ..config(5)
        });
        assert!(!fhss.hop_to_next_bind());
        assert_eq!(fhss.curr_frequency_band(), FrequencyBand::Ism2400);
    }

    #[test]
    fn test_band_persisted_value() {
        for band in [FrequencyBand::Ism2400, FrequencyBand::Fcc915, FrequencyBand::Eu868] {
            assert_eq!(FrequencyBand::from_u8(band.to_u8()), Some(band));
        }
        assert_eq!(FrequencyBand::from_u8(9), None);
    }
}
