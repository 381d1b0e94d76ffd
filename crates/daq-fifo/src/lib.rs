//! Cross-context data movement for the acquisition pipeline.
//!
//! This crate provides the building blocks that let two independently stepping
//! execution contexts (a fast producer side and a slow host side) exchange
//! 32-bit words and single-bit signals without sharing a scheduling tick:
//!
//! - [`relay`]: level, pulse and reset relays. Every value crosses through a
//!   two-stage [`relay::Synchronizer`] owned by the receiving context.
//! - [`storage`]: a fixed-depth dual-port word store with registered reads.
//! - [`fifo`]: a bounded single-producer/single-consumer queue built from the
//!   two above. Indices are published Gray-coded with release/acquire ordering
//!   and observed by the other side only through a synchronizer.
//!
//! # Stepping Model
//!
//! Nothing here spawns threads or blocks. Each context calls `step()`/`tick()`
//! on the handles it owns once per iteration of its own loop; the relayed view
//! of the other side advances only on those calls. A value published by one
//! side is visible to the other after [`SETTLE_STEPS`] of the receiver's steps.
//!
//! # Example
//!
//! ```
//! let (mut producer, mut consumer) = daq_fifo::channel(4).unwrap();
//!
//! assert!(producer.write(0xDEAD_BEEF));
//!
//! // Consumer has not observed the write yet
//! assert_eq!(consumer.read(), None);
//!
//! consumer.settle();
//! assert_eq!(consumer.read(), Some(0xDEAD_BEEF));
//! ```

pub mod fifo;
pub mod relay;
pub mod storage;

pub use fifo::{channel, Consumer, Producer};
pub use relay::{
    level_relay, pulse_relay, reset_line, LevelSink, LevelSource, PulseReceiver, PulseSender,
    ResetLine, ResetSource, ResetSync, Synchronizer,
};
pub use storage::{dual_port, Port};

use thiserror::Error;

/// Number of receiver steps a relayed value needs before it becomes visible.
pub const SETTLE_STEPS: usize = 2;

/// Largest supported queue capacity (indices are one bit wider than the address).
pub const MAX_CAPACITY: usize = 1 << 30;

/// Errors raised while constructing a queue.
///
/// Run-time flow conditions are not errors: a write into a full queue returns
/// `false` and a read from an empty queue returns `None`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    #[error("queue capacity must be greater than 0")]
    ZeroCapacity,

    #[error("queue capacity {0} is not a power of two")]
    CapacityNotPowerOfTwo(usize),

    #[error("queue capacity {0} exceeds maximum of {max}", max = MAX_CAPACITY)]
    CapacityTooLarge(usize),
}
