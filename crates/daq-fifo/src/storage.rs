//! Dual-port word storage.
//!
//! A fixed-depth array of 32-bit words reachable through two independent
//! [`Port`]s. Each port has its own enable and write flag and a registered read
//! output: the value returned for a clock is the one stored at the presented
//! address *before* that clock's write (read-first), never the value being
//! written in the same step.
//!
//! Both ports may access different addresses in the same step. Accessing the
//! same address from both ports in the same step yields an unspecified (but
//! never torn) read value; the queue in [`crate::fifo`] never does this.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Create storage of `depth` words, zero-initialized, and its two ports.
///
/// # Panics
/// Panics if `depth` is 0.
pub fn dual_port(depth: usize) -> (Port, Port) {
    assert!(depth > 0, "storage depth must be greater than 0");

    let cells: Arc<[AtomicU32]> = (0..depth).map(|_| AtomicU32::new(0)).collect();
    (
        Port {
            cells: cells.clone(),
            q: 0,
        },
        Port { cells, q: 0 },
    )
}

/// One side of the dual-port storage.
///
/// Ports are not `Clone`: each is owned by exactly one context.
#[derive(Debug)]
pub struct Port {
    cells: Arc<[AtomicU32]>,
    /// Registered read output
    q: u32,
}

impl Port {
    /// Apply one access.
    ///
    /// With `enable` low nothing happens and the read register holds its
    /// value. With `enable` high the word at `addr` is latched into the read
    /// register, then `data` is stored if `write` is set.
    ///
    /// Addresses wrap modulo the depth.
    pub fn clock(&mut self, enable: bool, write: bool, addr: usize, data: u32) {
        if !enable {
            return;
        }
        let cell = &self.cells[addr % self.cells.len()];
        self.q = cell.load(Ordering::Relaxed);
        if write {
            cell.store(data, Ordering::Relaxed);
        }
    }

    /// Store `data` at `addr`.
    pub fn write(&mut self, addr: usize, data: u32) {
        self.clock(true, true, addr, data);
    }

    /// Latch and return the word at `addr`.
    pub fn read(&mut self, addr: usize) -> u32 {
        self.clock(true, false, addr, 0);
        self.q
    }

    /// Registered read output.
    pub fn q(&self) -> u32 {
        self.q
    }

    /// Number of words.
    pub fn depth(&self) -> usize {
        self.cells.len()
    }
}
