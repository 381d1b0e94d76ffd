//! Byte transport seen from the host-protocol controller.
//!
//! The controller talks to its transport through a duplex ready/valid
//! contract, sampled once per slow-context step:
//!
//! - receive: a byte-arrived level carrying the byte ([`ByteLink::poll_rx`])
//! - transmit: busy level, start-send pulse, send-complete pulse
//!
//! Framing and bit timing live entirely behind this trait.

use std::collections::VecDeque;

/// Duplex byte transport driven by the host controller.
///
/// Each method is called at most once per controller step.
pub trait ByteLink: Send {
    /// Byte present on the receive side during this step.
    ///
    /// Implementations present each received byte for exactly one step and
    /// follow it with at least one idle step.
    fn poll_rx(&mut self) -> Option<u8>;

    /// Whether a byte is still being sent.
    fn tx_busy(&self) -> bool;

    /// Begin sending `byte`. Only called while [`ByteLink::tx_busy`] is low.
    fn start_tx(&mut self, byte: u8);

    /// Send-complete pulse: `true` on the step a byte finishes.
    fn poll_tx_done(&mut self) -> bool;
}

/// Transmit timing shared by the link implementations: busy for a fixed
/// number of steps per byte, then one done pulse.
#[derive(Debug, Clone)]
pub(crate) struct TxTimer {
    frame_steps: u32,
    remaining: u32,
}

impl TxTimer {
    pub(crate) fn new(frame_steps: u32) -> Self {
        Self {
            frame_steps: frame_steps.max(1),
            remaining: 0,
        }
    }

    pub(crate) fn busy(&self) -> bool {
        self.remaining > 0
    }

    pub(crate) fn start(&mut self) {
        self.remaining = self.frame_steps;
    }

    pub(crate) fn step(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }
}

/// Receive framing shared by the link implementations: a byte is followed by
/// one idle step so back-to-back bytes each produce an arrival edge.
#[derive(Debug, Clone, Default)]
pub(crate) struct RxGap {
    pending_gap: bool,
}

impl RxGap {
    pub(crate) fn poll(&mut self, next: impl FnOnce() -> Option<u8>) -> Option<u8> {
        if self.pending_gap {
            self.pending_gap = false;
            return None;
        }
        let byte = next()?;
        self.pending_gap = true;
        Some(byte)
    }
}

/// Synchronous in-memory link. The caller plays the host: it queues bytes for
/// the controller with [`LoopbackLink::send`] and collects what the
/// controller transmitted with [`LoopbackLink::take_sent`].
#[derive(Debug, Clone)]
pub struct LoopbackLink {
    inbox: VecDeque<u8>,
    rx: RxGap,
    tx: TxTimer,
    sent: Vec<u8>,
}

impl LoopbackLink {
    /// Create a link whose transmitter is busy for `tx_frame_steps` per byte.
    pub fn new(tx_frame_steps: u32) -> Self {
        Self {
            inbox: VecDeque::new(),
            rx: RxGap::default(),
            tx: TxTimer::new(tx_frame_steps),
            sent: Vec::new(),
        }
    }

    /// Queue bytes for the controller to receive.
    pub fn send(&mut self, bytes: &[u8]) {
        self.inbox.extend(bytes);
    }

    /// Bytes transmitted since the last call.
    pub fn take_sent(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sent)
    }

    /// Whether every queued byte has been presented.
    pub fn inbox_empty(&self) -> bool {
        self.inbox.is_empty()
    }
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ByteLink for LoopbackLink {
    fn poll_rx(&mut self) -> Option<u8> {
        let inbox = &mut self.inbox;
        self.rx.poll(|| inbox.pop_front())
    }

    fn tx_busy(&self) -> bool {
        self.tx.busy()
    }

    fn start_tx(&mut self, byte: u8) {
        self.sent.push(byte);
        self.tx.start();
    }

    fn poll_tx_done(&mut self) -> bool {
        self.tx.step()
    }
}
