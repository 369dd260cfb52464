//! Transport layer for I/O abstraction

use crate::error::Result;

mod mock;
mod serial;
pub use mock::MockTransport;
pub use serial::SerialLink;

/// Transport trait for device communication
///
/// `read` is non-blocking with a short internal timeout: it returns `Ok(0)`
/// when no bytes are currently available rather than waiting.
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read (0 = none waiting)
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0) // Default implementation
    }
}
