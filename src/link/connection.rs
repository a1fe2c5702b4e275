//! # Connection State Machine
//!
//! ```text
//! Listen --valid--> Sync --N more valid in a row--> Connected
//!    ^                |                                 |
//!    +---- no valid frame for connect_tmo systicks -----+
//! ```
//!
//! While listening the receiver parks on one channel and moves on every
//! `listen_hop_cnt` frame periods to scan for a transmitter.

use std::fmt;

use tracing::{debug, info};

/// Trust in the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// No recent valid traffic
    Listen,
    /// Collecting consecutive valid frames
    Sync,
    /// Link is live
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Listen => "listen",
            ConnectionState::Sync => "sync",
            ConnectionState::Connected => "connected",
        };
        write!(f, "{}", s)
    }
}

/// Connection state plus its counters
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    state: ConnectionState,
    sync_cnt: u8,
    tmo_cnt: u32,
    listen_cnt: u16,
    occurred_once: bool,

    sync_target: u8,
    tmo_systicks: u32,
    listen_hop_cnt: u16,
}

impl ConnectionTracker {
    /// Create a tracker in Listen
    ///
    /// # Arguments
    ///
    /// * `sync_target` - Valid frames needed in Sync to become Connected
    /// * `tmo_systicks` - Systicks without a valid frame before falling back to Listen
    /// * `listen_hop_cnt` - Frame periods per hop while listening
    pub fn new(sync_target: u8, tmo_systicks: u32, listen_hop_cnt: u16) -> Self {
        Self {
            state: ConnectionState::Listen,
            sync_cnt: 0,
            tmo_cnt: 0,
            listen_cnt: 0,
            occurred_once: false,
            sync_target: sync_target.max(1),
            tmo_systicks,
            listen_hop_cnt: listen_hop_cnt.max(1),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Connected at least once since start
    pub fn occurred_once(&self) -> bool {
        self.occurred_once
    }

    /// Consecutive valid frames collected in Sync
    pub fn sync_cnt(&self) -> u8 {
        self.sync_cnt
    }

    /// Remaining systicks before the timeout
    pub fn tmo_cnt(&self) -> u32 {
        self.tmo_cnt
    }

    /// A valid frame was received this cycle
    pub fn on_valid_frame(&mut self) {
        match self.state {
            ConnectionState::Listen => {
                self.state = ConnectionState::Sync;
                self.sync_cnt = 0;
                debug!("Connection: listen -> sync");
            }
            ConnectionState::Sync => {
                self.sync_cnt += 1;
                if self.sync_cnt >= self.sync_target {
                    self.state = ConnectionState::Connected;
                    self.occurred_once = true;
                    info!("Connection: connected");
                }
            }
            ConnectionState::Connected => {}
        }
        self.tmo_cnt = self.tmo_systicks;
    }

    /// A cycle passed without a valid frame; a gap in Sync restarts the count
    pub fn on_frame_missed(&mut self) {
        if self.state == ConnectionState::Sync && self.sync_cnt > 0 {
            debug!("Connection: sync count reset after {}", self.sync_cnt);
            self.sync_cnt = 0;
        }
    }

    /// One systick
    pub fn tick(&mut self) {
        self.tmo_cnt = self.tmo_cnt.saturating_sub(1);
    }

    /// Drop to Listen if the timeout has run out
    ///
    /// # Returns
    ///
    /// * `bool` - true if the connection was just lost
    pub fn check_timeout(&mut self) -> bool {
        if self.state == ConnectionState::Listen || self.tmo_cnt > 0 {
            return false;
        }
        info!("Connection: {} -> listen (timeout)", self.state);
        self.state = ConnectionState::Listen;
        self.sync_cnt = 0;
        self.listen_cnt = 0;
        true
    }

    /// One frame period while listening
    ///
    /// # Returns
    ///
    /// * `bool` - true when it is time to hop to the next channel
    pub fn listen_tick(&mut self) -> bool {
        if self.state != ConnectionState::Listen {
            return false;
        }
        self.listen_cnt += 1;
        if self.listen_cnt >= self.listen_hop_cnt {
            self.listen_cnt = 0;
            return true;
        }
        false
    }

    /// Back to Listen without a timeout, e.g. when entering bind
    pub fn force_listen(&mut self) {
        self.state = ConnectionState::Listen;
        self.sync_cnt = 0;
        self.listen_cnt = 0;
    }
}
