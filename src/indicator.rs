//! # Indicator Outputs
//!
//! LEDs and buzzer, fire-and-forget. The engine drives them through the
//! `Indicator` trait; `LedBlinker` turns the connection state into the
//! blink pattern, one systick at a time.

use std::fmt;

use tracing::{error, trace};

/// Blink pattern signalling a protocol fault or fatal startup error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPattern {
    /// Radio 1 not responding, or unexpected receive-done on radio 1
    GreenOffRedBlink,
    /// Radio 2 not responding, or unexpected transmit-done on radio 1
    RedOffGreenBlink,
    /// Unexpected receive-done on radio 2
    GreenOnRedBlink,
    /// Unexpected transmit-done on radio 2
    RedOnGreenBlink,
    /// Unexpected timeout on radio 1
    BlinkCommon,
    /// Unexpected timeout on radio 2
    BlinkAlternate,
}

impl fmt::Display for FailPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailPattern::GreenOffRedBlink => "green off, red blink",
            FailPattern::RedOffGreenBlink => "red off, green blink",
            FailPattern::GreenOnRedBlink => "green on, red blink",
            FailPattern::RedOnGreenBlink => "red on, green blink",
            FailPattern::BlinkCommon => "common blink",
            FailPattern::BlinkAlternate => "alternate blink",
        };
        write!(f, "{}", s)
    }
}

/// LED and buzzer driver
#[cfg_attr(test, mockall::automock)]
pub trait Indicator: Send {
    /// Set both LEDs
    fn set_leds(&mut self, green: bool, red: bool);

    /// Short beep for a lost packet
    fn beep_lost_packet(&mut self);

    /// Show a fault pattern
    ///
    /// # Arguments
    ///
    /// * `pattern` - Blink pattern identifying the fault
    /// * `message` - Diagnostic text
    fn fail(&mut self, pattern: FailPattern, message: &str);
}

/// Indicator that only logs, used by the simulator
#[derive(Debug, Default, Clone)]
pub struct LogIndicator {
    leds: (bool, bool),
    beeps: u32,
    faults: u32,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (green, red) LED state
    pub fn leds(&self) -> (bool, bool) {
        self.leds
    }

    pub fn beeps(&self) -> u32 {
        self.beeps
    }

    pub fn faults(&self) -> u32 {
        self.faults
    }
}

impl Indicator for LogIndicator {
    fn set_leds(&mut self, green: bool, red: bool) {
        if self.leds != (green, red) {
            trace!("LEDs green={} red={}", green, red);
        }
        self.leds = (green, red);
    }

    fn beep_lost_packet(&mut self) {
        self.beeps += 1;
        trace!("Beep");
    }

    fn fail(&mut self, pattern: FailPattern, message: &str) {
        self.faults += 1;
        error!("Indicator fail ({}): {}", pattern, message);
    }
}

/// Blink period while connected
pub const LED_BLINK_CONNECTED_MS: u16 = 500;

/// Blink period while not connected (and while binding)
pub const LED_BLINK_DISCONNECTED_MS: u16 = 200;

/// What the LEDs should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Connected,
    Disconnected,
    Bind,
}

/// LED blink state, advanced once per systick
#[derive(Debug, Clone)]
pub struct LedBlinker {
    cnt: u16,
    green: bool,
    red: bool,
}

impl Default for LedBlinker {
    fn default() -> Self {
        Self::new()
    }
}

impl LedBlinker {
    pub fn new() -> Self {
        Self {
            cnt: 0,
            green: false,
            red: false,
        }
    }

    /// Force both LEDs, e.g. when entering bind or storing parameters
    pub fn set(&mut self, green: bool, red: bool) {
        self.green = green;
        self.red = red;
    }

    /// One systick
    ///
    /// # Returns
    ///
    /// * `(bool, bool)` - (green, red) to show
    pub fn tick(&mut self, mode: LedMode) -> (bool, bool) {
        let period = match mode {
            LedMode::Connected => LED_BLINK_CONNECTED_MS,
            _ => LED_BLINK_DISCONNECTED_MS,
        };
        self.cnt = if self.cnt == 0 { period - 1 } else { self.cnt - 1 };
        let toggle = self.cnt == 0;

        match mode {
            LedMode::Bind => {
                if toggle {
                    self.green = !self.green;
                    self.red = !self.red;
                }
            }
            LedMode::Connected => {
                if toggle {
                    self.green = !self.green;
                }
                self.red = false;
            }
            LedMode::Disconnected => {
                self.green = false;
                if toggle {
                    self.red = !self.red;
                }
            }
        }

        (self.green, self.red)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggles(blinker: &mut LedBlinker, mode: LedMode, ticks: usize) -> usize {
        let mut last = blinker.tick(mode);
        let mut n = 0;
        for _ in 1..ticks {
            let now = blinker.tick(mode);
            if now != last {
                n += 1;
            }
            last = now;
        }
        n
    }

    #[test]
    fn test_disconnected_blinks_red_at_200ms() {
        let mut blinker = LedBlinker::new();
        let n = toggles(&mut blinker, LedMode::Disconnected, 1000);
        assert!((4..=5).contains(&n), "Expected ~5 red toggles per second, got {}", n);
        let (green, _) = blinker.tick(LedMode::Disconnected);
        assert!(!green, "Green stays off while disconnected");
    }

    #[test]
    fn test_connected_blinks_green_at_500ms() {
        let mut blinker = LedBlinker::new();
        let n = toggles(&mut blinker, LedMode::Connected, 1000);
        assert!((1..=2).contains(&n), "Expected ~2 green toggles per second, got {}", n);
        let (_, red) = blinker.tick(LedMode::Connected);
        assert!(!red, "Red stays off while connected");
    }

    #[test]
    fn test_bind_alternates() {
        let mut blinker = LedBlinker::new();
        blinker.set(true, false);
        for _ in 0..1000 {
            let (green, red) = blinker.tick(LedMode::Bind);
            assert_ne!(green, red, "Bind pattern alternates red and green");
        }
    }

    #[test]
    fn test_log_indicator_counts() {
        let mut indicator = LogIndicator::new();
        indicator.set_leds(true, false);
        indicator.beep_lost_packet();
        indicator.fail(FailPattern::BlinkCommon, "test");
        assert_eq!(indicator.leds(), (true, false));
        assert_eq!(indicator.beeps(), 1);
        assert_eq!(indicator.faults(), 1);
    }
}
