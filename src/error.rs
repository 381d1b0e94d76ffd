//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, used everywhere a
//! failure can reach a caller: configuration loading, queue construction,
//! transport I/O and the host-side acquisition client.
//!
//! ## What Is Not an Error
//!
//! The flow-control conditions of the acquisition core never show up here:
//!
//! - a sample produced while the queue is full is dropped and counted,
//! - a read from an empty queue ends the current stream,
//! - an unknown command byte is ignored.
//!
//! These are ordinary branches in the controllers, not failures.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps `figment::Error` (file parsing, type mismatches,
//!   bad environment overrides).
//! - **`Configuration`**: Values that parse but fail validation.
//! - **`Fifo`**: Queue construction rejected by `daq_fifo`.
//! - **`Io`** / **`Serial`** / **`Transport`**: Host link problems.
//! - **`Timeout`** / **`ShortRead`**: The host did not receive the expected
//!   byte count. The wire protocol has no terminator, so these are the only
//!   way a host notices a short stream.

use daq_fifo::FifoError;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Queue error: {0}")]
    Fifo(#[from] FifoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {elapsed_ms} ms waiting for {what}")]
    Timeout { what: String, elapsed_ms: u64 },

    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

impl DaqError {
    /// Whether retrying the same operation can succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DaqError::Timeout { .. } | DaqError::ShortRead { .. } | DaqError::Transport(_)
        )
    }
}
