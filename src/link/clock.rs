//! # Frame Clock
//!
//! Software clock driven by the 1 ms systick. It raises the post-receive
//! trigger once per frame period, and is re-phased on every good reception
//! so that the trigger fires 1 ms after the frame arrived.

/// Post-receive trigger source
#[derive(Debug, Clone)]
pub struct FrameClock {
    period_ms: u16,
    cnt_ms: u16,
    triggered: bool,
}

impl FrameClock {
    /// Create a clock with the given frame period
    pub fn new(period_ms: u16) -> Self {
        Self {
            period_ms: period_ms.max(1),
            cnt_ms: 0,
            triggered: false,
        }
    }

    /// Frame period in ms
    pub fn period_ms(&self) -> u16 {
        self.period_ms
    }

    /// Change the frame period, takes effect from the next trigger
    pub fn set_period(&mut self, period_ms: u16) {
        self.period_ms = period_ms.max(1);
        self.cnt_ms = self.cnt_ms.min(self.period_ms - 1);
    }

    /// Re-phase: trigger on the next systick, then every period.
    /// A trigger still pending from the old phase is dropped.
    pub fn reset(&mut self) {
        self.cnt_ms = self.period_ms - 1;
        self.triggered = false;
    }

    /// One systick
    pub fn tick(&mut self) {
        self.cnt_ms += 1;
        if self.cnt_ms >= self.period_ms {
            self.cnt_ms = 0;
            self.triggered = true;
        }
    }

    /// Consume the pending trigger
    pub fn take_trigger(&mut self) -> bool {
        std::mem::take(&mut self.triggered)
    }
}
