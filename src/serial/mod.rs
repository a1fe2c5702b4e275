//! # Serial Module
//!
//! Byte stream ports of the link engine.
//!
//! This module handles:
//! - The `SerialPort` trait consumed by the serial passthrough and outputs
//! - `BufferedSerial`, an in-process port with shared input/output queues,
//!   used by the simulator and in tests

pub mod port_trait;

pub use port_trait::SerialPort;

use bytes::{Buf, BufMut, BytesMut};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Default capacity of each queue in bytes
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

#[derive(Debug, Default)]
struct Queues {
    rx: BytesMut,
    tx: BytesMut,
}

/// In-process serial port.
///
/// Clones share the same queues: one clone is handed to the engine, the
/// other is kept to inject input and drain output.
#[derive(Debug, Clone)]
pub struct BufferedSerial {
    queues: Arc<Mutex<Queues>>,
    capacity: usize,
}

impl Default for BufferedSerial {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl BufferedSerial {
    /// Create a port whose queues hold at most `capacity` bytes each
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(Queues {
                rx: BytesMut::with_capacity(capacity),
                tx: BytesMut::with_capacity(capacity),
            })),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make bytes available for reading.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of bytes accepted, the rest is dropped when full
    pub fn inject(&self, data: &[u8]) -> usize {
        let mut queues = self.lock();
        let room = self.capacity.saturating_sub(queues.rx.len());
        let n = data.len().min(room);
        queues.rx.put_slice(&data[..n]);
        if n < data.len() {
            warn!("Serial input overflow, {} bytes dropped", data.len() - n);
        }
        n
    }

    /// Take everything written to the port so far
    pub fn drain(&self) -> Vec<u8> {
        let mut queues = self.lock();
        let out = queues.tx.to_vec();
        queues.tx.clear();
        out
    }

    /// Bytes written and not yet drained
    pub fn pending_output(&self) -> usize {
        self.lock().tx.len()
    }
}

impl SerialPort for BufferedSerial {
    fn available(&self) -> bool {
        !self.lock().rx.is_empty()
    }

    fn bytes_available(&self) -> usize {
        self.lock().rx.len()
    }

    fn getc(&mut self) -> Option<u8> {
        let mut queues = self.lock();
        if queues.rx.has_remaining() {
            Some(queues.rx.get_u8())
        } else {
            None
        }
    }

    fn putc(&mut self, c: u8) {
        let mut queues = self.lock();
        if queues.tx.len() < self.capacity {
            queues.tx.put_u8(c);
        }
    }

    fn write(&mut self, data: &[u8]) {
        let mut queues = self.lock();
        let room = self.capacity.saturating_sub(queues.tx.len());
        let n = data.len().min(room);
        queues.tx.put_slice(&data[..n]);
    }

    fn flush(&mut self) {
        let mut queues = self.lock();
        queues.rx.clear();
        queues.tx.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_and_read() {
        let handle = BufferedSerial::default();
        let mut port = handle.clone();

        assert!(!port.available());
        assert_eq!(port.getc(), None);

        handle.inject(b"ab");
        assert!(port.available());
        assert_eq!(port.bytes_available(), 2);
        assert_eq!(port.getc(), Some(b'a'));
        assert_eq!(port.getc(), Some(b'b'));
        assert_eq!(port.getc(), None);
    }

    #[test]
    fn test_write_and_drain() {
        let handle = BufferedSerial::default();
        let mut port = handle.clone();

        port.putc(0x01);
        port.write(&[0x02, 0x03]);
        assert_eq!(handle.pending_output(), 3);
        assert_eq!(handle.drain(), vec![1, 2, 3]);
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn test_capacity_limits() {
        let handle = BufferedSerial::new(4);
        let mut port = handle.clone();

        assert_eq!(handle.inject(b"123456"), 4, "Input beyond capacity is dropped");
        port.write(b"abcdef");
        assert_eq!(handle.drain(), b"abcd".to_vec());
    }

    #[test]
    fn test_flush_discards_both_directions() {
        let handle = BufferedSerial::default();
        let mut port = handle.clone();
        handle.inject(b"xyz");
        port.write(b"uvw");

        port.flush();
        assert!(!port.available());
        assert_eq!(handle.pending_output(), 0);
    }
}
