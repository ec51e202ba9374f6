//! Request/response link to a Marlin motion controller.
//!
//! Every G-code command is answered by zero or more data lines followed by a
//! line ending in `ok`. Custom firmware commands may fuse their payload onto
//! that last line (`Data: 12.5ok`), in which case the payload is returned as
//! the final response element.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::transport::{SerialTransport, Transport};

/// Default serial device of the gantry controller.
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Default serial baud rate.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Response timeout for ordinary commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Silence that marks the end of the boot banner.
pub const BOOT_QUIET_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for `M400` after a single short move.
pub const MOTION_SETTLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for `M400` after returning to the origin.
pub const PARK_TIMEOUT: Duration = Duration::from_secs(40);

/// Errors from the Marlin link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("cannot open serial port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("no response to '{command}' within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Exclusive connection to one Marlin controller.
///
/// The transport is closed when the link is dropped.
pub struct MarlinLink {
    transport: Box<dyn Transport + Send>,
    name: String,
}

impl MarlinLink {
    /// Open the serial port `port` at `baud`.
    pub fn connect(port: &str, baud: u32) -> LinkResult<Self> {
        let transport = SerialTransport::open(port, baud).map_err(|source| LinkError::Connection {
            port: port.to_string(),
            source,
        })?;
        info!("Connected to {port} at {baud} baud");
        Ok(Self {
            transport: Box::new(transport),
            name: port.to_string(),
        })
    }

    /// Wrap an already open transport.
    pub fn new(transport: impl Transport + Send + 'static, name: impl Into<String>) -> Self {
        Self {
            transport: Box::new(transport),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send `command` and collect its response.
    ///
    /// Stale input is discarded before sending. Each line must arrive within
    /// `timeout`; a timeout is reported, never retried.
    pub fn execute(&mut self, command: &str, timeout: Duration) -> LinkResult<Vec<String>> {
        let command = command.trim_end();
        self.transport.discard_input()?;
        debug!("> {command}");
        self.transport.write_line(command)?;

        let mut response = Vec::new();
        loop {
            let Some(line) = self.transport.read_line(timeout)? else {
                return Err(LinkError::Timeout {
                    command: command.to_string(),
                    timeout,
                });
            };
            let line = line.trim();
            debug!("< {line}");
            if let Some(payload) = line.strip_suffix("ok") {
                if !payload.is_empty() {
                    response.push(payload.to_string());
                }
                return Ok(response);
            }
            response.push(line.to_string());
        }
    }

    /// [`execute`](Self::execute) with [`DEFAULT_TIMEOUT`].
    pub fn command(&mut self, command: &str) -> LinkResult<Vec<String>> {
        self.execute(command, DEFAULT_TIMEOUT)
    }

    /// Swallow the boot banner, returning once the device has been quiet
    /// for [`BOOT_QUIET_TIMEOUT`].
    pub fn wait_for_boot(&mut self) -> LinkResult<()> {
        let mut lines = 0usize;
        while let Some(line) = self.transport.read_line(BOOT_QUIET_TIMEOUT)? {
            debug!("boot: {}", line.trim());
            lines += 1;
        }
        info!("Device quiet after {lines} boot lines");
        Ok(())
    }
}

impl Drop for MarlinLink {
    fn drop(&mut self) {
        debug!("Closing link to {}", self.name);
    }
}
