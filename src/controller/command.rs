//! Edge-triggered command decoding.

use crate::sample::Command;
use tracing::debug;

/// Turns the transport's byte-arrived level into one-step command events.
///
/// A byte counts only on the step it first appears. A byte held present over
/// several steps decodes once; it must go idle before the next byte counts.
#[derive(Debug, Default)]
pub struct CommandDecoder {
    prev_valid: bool,
}

impl CommandDecoder {
    /// Create a decoder with no byte present.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the receive side for one step.
    ///
    /// Returns the command whose byte arrived on this step, if any. Bytes that
    /// are not commands decode to nothing.
    pub fn step(&mut self, rx: Option<u8>) -> Option<Command> {
        let valid = rx.is_some();
        let edge = valid && !self.prev_valid;
        self.prev_valid = valid;

        let byte = rx.filter(|_| edge)?;
        let command = Command::from_byte(byte);
        if command.is_none() {
            debug!(byte = %format!("0x{byte:02X}"), "ignoring unknown command byte");
        }
        command
    }

    /// Forget the previous step.
    pub fn reset(&mut self) {
        self.prev_valid = false;
    }
}
