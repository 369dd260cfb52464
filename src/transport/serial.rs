//! Serial transport implementation

use super::Transport;
use crate::error::{Error, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

/// Serial link to the base controller
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(1))
            .open()?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialLink { port })
    }

    /// Open with a fixed number of attempts and fixed backoff between them
    ///
    /// There is no automatic retry after this returns an error; the caller
    /// must explicitly reinitiate.
    pub fn open_with_retry(
        path: &str,
        baud_rate: u32,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Self> {
        let attempts = attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match Self::open(path, baud_rate) {
                Ok(link) => return Ok(link),
                Err(e) => {
                    log::warn!(
                        "SerialLink: open attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        thread::sleep(backoff);
                    }
                }
            }
        }

        Err(Error::ConnectFailed {
            attempts,
            last_error,
        })
    }
}

impl Transport for SerialLink {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.port.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }
}
