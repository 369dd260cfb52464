//! Scripted transport for exercising the driver without hardware
//!
//! Mirrors the serial link's non-blocking contract: `read` drains whatever
//! has been injected and reports `Ok(0)` for a quiet line, exactly as the
//! real port does on timeout. A fault can be armed to make every subsequent
//! read fail the way a dead or unplugged device would, which is how the
//! driver's disconnect path is tested.

use super::Transport;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Scripted in-memory transport
///
/// Clones share the same script, so a test keeps one handle for injection
/// and inspection while the driver owns the other.
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Mutex<Script>>,
}

struct Script {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    read_faulted: bool,
}

impl MockTransport {
    /// Create a transport with an empty script and a quiet line
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Mutex::new(Script {
                inbound: VecDeque::new(),
                outbound: Vec::new(),
                read_faulted: false,
            })),
        }
    }

    /// Queue bytes for the driver to read
    pub fn inject_read(&self, bytes: &[u8]) {
        self.shared.lock().inbound.extend(bytes);
    }

    /// Queue several frames as one contiguous burst, no gaps between them
    pub fn inject_burst<I>(&self, frames: I)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut script = self.shared.lock();
        for frame in frames {
            script.inbound.extend(frame);
        }
    }

    /// Arm a persistent fault: every read from now on fails
    pub fn fail_reads(&self) {
        self.shared.lock().read_faulted = true;
    }

    /// Everything the driver has written, in order
    pub fn get_written(&self) -> Vec<u8> {
        self.shared.lock().outbound.clone()
    }

    /// Forget captured writes
    pub fn clear_written(&self) {
        self.shared.lock().outbound.clear();
    }

    /// Discard any unread injected bytes
    pub fn clear_read(&self) {
        self.shared.lock().inbound.clear();
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut script = self.shared.lock();
        if script.read_faulted {
            return Err(std::io::Error::other("injected device fault").into());
        }

        let mut n = 0;
        while n < buffer.len() {
            match script.inbound.pop_front() {
                Some(byte) => {
                    buffer[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.shared.lock().outbound.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.shared.lock().inbound.len())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_line_reads_zero() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 8];
        assert_eq!(mock.read(&mut buf).unwrap(), 0);

        mock.inject_read(&[1, 2, 3]);
        assert_eq!(mock.available().unwrap(), 3);
        assert_eq!(mock.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);

        // Drained: back to the quiet-line contract
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_clones_share_script() {
        let mock = MockTransport::new();
        let mut driver_side = mock.clone();

        mock.inject_burst([vec![0xAA, 0x55], vec![0x02, 0x08]]);
        let mut buf = [0u8; 8];
        assert_eq!(driver_side.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[0xAA, 0x55, 0x02, 0x08]);

        driver_side.write(&[9, 9]).unwrap();
        assert_eq!(mock.get_written(), vec![9, 9]);
        mock.clear_written();
        assert!(mock.get_written().is_empty());
    }

    #[test]
    fn test_armed_fault_fails_every_read() {
        let mut mock = MockTransport::new();
        mock.inject_read(&[1, 2, 3]);
        mock.fail_reads();

        let mut buf = [0u8; 8];
        assert!(mock.read(&mut buf).is_err());

        // The fault persists even with the queue cleared
        mock.clear_read();
        assert!(mock.read(&mut buf).is_err());
    }
}
