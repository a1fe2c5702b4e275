//! # Frame Module
//!
//! Air frame codec of the link.
//!
//! This module handles:
//! - Frame layout and header fields
//! - Packing Tx, Rx and bind frames
//! - Two-tier validation (header crc1 + trailer crc16)
//! - 11-bit RC channel packing
//! - Command payloads carried in command frames

pub mod command;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod protocol;
pub mod rc;
