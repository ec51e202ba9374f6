//! Scripted in-memory Marlin controller for tests and dry runs.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::sensor::AS7341_CHANNELS;
use super::transport::Transport;

type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

/// Shared record of every command written to a [`MockMarlin`].
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    fn push(&self, command: &str) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command.to_string());
    }

    /// Commands sent so far, without line terminators.
    pub fn commands(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// [`Transport`] answering each command through a responder closure.
///
/// The responder returns the full reply, including the terminating `ok`
/// line. Reads never block: when no reply lines are queued, `read_line`
/// reports a timeout straight away.
pub struct MockMarlin {
    responder: Responder,
    pending: VecDeque<String>,
    log: CommandLog,
}

impl MockMarlin {
    pub fn new(responder: impl FnMut(&str) -> Vec<String> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            log: CommandLog::default(),
        }
    }

    /// Queue lines that are waiting before the first command, like a boot banner.
    pub fn with_pending<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Handle on the command log, valid after the mock is moved into a link.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Simulated gantry scanning a display whose brightness at `(x, y)` mm
    /// is `field(x, y)`.
    ///
    /// Tracks the head position through `G0`/`G1`/`G28`, answers `M5500`
    /// and `M5501` with a reading at the current position and `M6000` with
    /// evenly spaced readings along the requested traverse.
    pub fn gantry(field: impl Fn(f64, f64) -> f64 + Send + 'static) -> Self {
        let (mut x, mut y) = (0.0, 0.0);
        Self::new(move |command| {
            let mut words = command.split_whitespace();
            let code = words.next().unwrap_or_default().to_ascii_uppercase();
            let param = |letter: char| -> Option<f64> {
                command
                    .split_whitespace()
                    .skip(1)
                    .find_map(|w| w.strip_prefix(letter).and_then(|v| v.parse().ok()))
            };

            let mut reply = Vec::new();
            match code.as_str() {
                "G0" | "G1" => {
                    x = param('X').unwrap_or(x);
                    y = param('Y').unwrap_or(y);
                }
                "G28" => (x, y) = (0.0, 0.0),
                "M5500" => reply.push(format!("Data: {}", field(x, y))),
                "M5501" => {
                    let mut channels = vec!["0".to_string(); AS7341_CHANNELS];
                    channels[10] = format!("{}", field(x, y));
                    reply.push(format!("Data: {}", channels.join(" ")));
                }
                "M6000" => {
                    let count = param('S').unwrap_or(0.0) as usize;
                    let target = param('X').unwrap_or(x);
                    match param('P') {
                        Some(p) if p == 0.0 || p == 1.0 => {
                            let step = (target - x) / count.max(1) as f64;
                            for k in 0..count {
                                reply.push(format!("{}", field(x + (k as f64 + 0.5) * step, y)));
                            }
                            x = target;
                        }
                        _ => reply.push("Unknown sensor specified".to_string()),
                    }
                }
                _ => {}
            }
            reply.push("ok".to_string());
            reply
        })
    }
}

impl Transport for MockMarlin {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let command = line.trim_end();
        self.log.push(command);
        let reply = (self.responder)(command);
        self.pending.extend(reply);
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> io::Result<Option<String>> {
        Ok(self.pending.pop_front())
    }
}
