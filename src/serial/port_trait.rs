//! Trait abstraction for the byte streams the link engine talks to

/// Non-blocking byte stream.
///
/// Used for the serial passthrough and for RC/telemetry outputs. Every call
/// returns immediately; a port with nothing to read reports `available() ==
/// false`.
#[cfg_attr(test, mockall::automock)]
pub trait SerialPort: Send {
    /// At least one byte can be read
    fn available(&self) -> bool;

    /// Number of bytes waiting to be read
    fn bytes_available(&self) -> usize;

    /// Read one byte, `None` if nothing is waiting
    fn getc(&mut self) -> Option<u8>;

    /// Queue one byte for output
    fn putc(&mut self, c: u8);

    /// Queue a block of bytes for output
    fn write(&mut self, data: &[u8]) {
        for &c in data {
            self.putc(c);
        }
    }

    /// Discard pending input and output
    fn flush(&mut self);
}
