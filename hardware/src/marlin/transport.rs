//! Line-oriented byte transports underneath the Marlin link.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};

/// Upper bound on a single blocking read, so deadlines are honoured.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Text line transport to a device.
///
/// Implemented by [`SerialTransport`] for real hardware and by
/// [`MockMarlin`](super::mock::MockMarlin) for tests.
pub trait Transport {
    /// Send one line, appending `\n` if it is missing.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Drop every byte received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;

    /// Read one line, without its terminator.
    ///
    /// Returns `Ok(None)` when `timeout` elapses with nothing received. A
    /// partial line received before the timeout is returned as is.
    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>>;
}

/// [`Transport`] over a serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open `path` at `baud` (8N1, no flow control).
    pub fn open(path: &str, baud: u32) -> serialport::Result<Self> {
        let port = serialport::new(path, baud).timeout(POLL_INTERVAL).open()?;
        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim_end_matches(['\r', '\n']).to_string())
    }
}

impl Transport for SerialTransport {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.port.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.port.write_all(b"\n")?;
        }
        self.port.flush()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; 256];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            let now = Instant::now();
            if now >= deadline {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let partial = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return Ok(Some(partial));
            }

            self.port.set_timeout((deadline - now).min(POLL_INTERVAL))?;
            match self.port.read(&mut buffer) {
                Ok(n) => self.pending.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}
