//! # hoplink
//!
//! Receiver side of a frequency-hopping, dual-antenna radio control link.
//!
//! The link engine alternates receive and transmit slots on a pseudo-random
//! hop sequence shared with the transmitter, picks the better of two
//! antennas for every received frame, tracks link quality and connection
//! state, and delivers RC data, serial passthrough and link statistics to
//! its outputs. A host-side simulator runs the engine against a simulated
//! transmitter over a simulated air.

pub mod bind;
pub mod config;
pub mod diversity;
pub mod error;
pub mod fhss;
pub mod frame;
pub mod indicator;
pub mod link;
pub mod link_quality;
pub mod out;
pub mod radio;
pub mod serial;
pub mod setup;
pub mod sim;
pub mod stats;
pub mod telemetry;
