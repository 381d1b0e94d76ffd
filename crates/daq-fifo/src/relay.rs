//! Single-bit relays between execution contexts.
//!
//! All three relays share one shape: the source context writes an atomic with
//! `Release` ordering, the destination context samples it with `Acquire` once
//! per step into a two-stage [`Synchronizer`], and only the second stage is
//! ever acted upon.
//!
//! - **Level relay** ([`level_relay`]): republishes a bit after two destination
//!   steps. A change is never observed half-way.
//! - **Pulse relay** ([`pulse_relay`]): the sender flips a toggle per event, the
//!   toggle crosses as a level, the receiver emits one event per observed
//!   toggle change. Two events fired within one settle-plus-decode window of
//!   the receiver cancel out and are lost.
//! - **Reset relay** ([`reset_line`]): assertion is seen on the very next
//!   destination step, release only after two consecutive released steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Synchronizer
// =============================================================================

/// Two-stage register chain owned by the receiving context.
///
/// A value sampled at step `n` appears at the output after step `n + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Synchronizer<T> {
    stage1: T,
    stage2: T,
}

impl<T: Copy> Synchronizer<T> {
    /// Create a synchronizer with both stages holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            stage1: initial,
            stage2: initial,
        }
    }

    /// Advance one step, sampling `input` into the first stage.
    ///
    /// Returns the settled (second stage) value.
    pub fn step(&mut self, input: T) -> T {
        self.stage2 = self.stage1;
        self.stage1 = input;
        self.stage2
    }

    /// Settled output.
    pub fn value(&self) -> T {
        self.stage2
    }

    /// Force both stages to `value`.
    pub fn force(&mut self, value: T) {
        self.stage1 = value;
        self.stage2 = value;
    }
}

// =============================================================================
// Level Relay
// =============================================================================

/// Create a level relay holding `initial` on both sides.
pub fn level_relay(initial: bool) -> (LevelSource, LevelSink) {
    let line = Arc::new(AtomicBool::new(initial));
    (
        LevelSource { line: line.clone() },
        LevelSink {
            line,
            sync: Synchronizer::new(initial),
        },
    )
}

/// Writing end of a level relay.
#[derive(Debug, Clone)]
pub struct LevelSource {
    line: Arc<AtomicBool>,
}

impl LevelSource {
    /// Drive the level.
    pub fn set(&self, level: bool) {
        self.line.store(level, Ordering::Release);
    }

    /// Level currently driven by the source.
    pub fn get(&self) -> bool {
        self.line.load(Ordering::Acquire)
    }
}

/// Reading end of a level relay, stepped by the destination context.
#[derive(Debug)]
pub struct LevelSink {
    line: Arc<AtomicBool>,
    sync: Synchronizer<bool>,
}

impl LevelSink {
    /// Sample the source once and return the settled level.
    pub fn step(&mut self) -> bool {
        self.sync.step(self.line.load(Ordering::Acquire))
    }

    /// Settled level as of the last step.
    pub fn get(&self) -> bool {
        self.sync.value()
    }
}

// =============================================================================
// Pulse Relay
// =============================================================================

/// Create a pulse relay. Both toggles start low, so no event is pending.
pub fn pulse_relay() -> (PulseSender, PulseReceiver) {
    let (source, sink) = level_relay(false);
    (
        PulseSender {
            source,
            toggle: false,
        },
        PulseReceiver {
            sink,
            last: false,
            received: 0,
        },
    )
}

/// Edge-encoding end of a pulse relay.
#[derive(Debug)]
pub struct PulseSender {
    source: LevelSource,
    toggle: bool,
}

impl PulseSender {
    /// Emit one event.
    pub fn fire(&mut self) {
        self.toggle = !self.toggle;
        self.source.set(self.toggle);
    }
}

/// Edge-decoding end of a pulse relay.
#[derive(Debug)]
pub struct PulseReceiver {
    sink: LevelSink,
    last: bool,
    received: u64,
}

impl PulseReceiver {
    /// Advance one step. Returns `true` on the single step where a new event
    /// becomes visible.
    pub fn step(&mut self) -> bool {
        let now = self.sink.step();
        let fired = now != self.last;
        self.last = now;
        if fired {
            self.received += 1;
        }
        fired
    }

    /// Events decoded since creation.
    pub fn received(&self) -> u64 {
        self.received
    }
}

// =============================================================================
// Reset Relay
// =============================================================================

/// Create a reset line. The line starts asserted (power-on reset).
pub fn reset_line() -> (ResetSource, ResetLine) {
    let line = Arc::new(AtomicBool::new(true));
    (ResetSource { line: line.clone() }, ResetLine { line })
}

/// Controls the shared reset line.
#[derive(Debug, Clone)]
pub struct ResetSource {
    line: Arc<AtomicBool>,
}

impl ResetSource {
    /// Assert reset in every context.
    pub fn assert(&self) {
        self.line.store(true, Ordering::Release);
    }

    /// Release reset. Each context observes the release after its own
    /// two-step confirmation.
    pub fn release(&self) {
        self.line.store(false, Ordering::Release);
    }

    /// Whether the line is currently driven asserted.
    pub fn is_asserted(&self) -> bool {
        self.line.load(Ordering::Acquire)
    }
}

/// Shared view of the reset line, handed to each context.
#[derive(Debug, Clone)]
pub struct ResetLine {
    line: Arc<AtomicBool>,
}

impl ResetLine {
    /// Build the per-context synchronizer. It starts asserted.
    pub fn synchronizer(&self) -> ResetSync {
        ResetSync {
            line: self.line.clone(),
            sync: Synchronizer::new(true),
        }
    }
}

/// Per-context reset synchronizer: asserts immediately, releases after two
/// confirmed steps.
#[derive(Debug)]
pub struct ResetSync {
    line: Arc<AtomicBool>,
    sync: Synchronizer<bool>,
}

impl ResetSync {
    /// Advance one step. Returns `true` while the context must stay in reset.
    pub fn step(&mut self) -> bool {
        if self.line.load(Ordering::Acquire) {
            self.sync.force(true);
            return true;
        }
        self.sync.step(false)
    }

    /// Reset state as of the last step.
    pub fn is_asserted(&self) -> bool {
        self.sync.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronizer_two_step_delay() {
        let mut sync = Synchronizer::new(0u32);
        assert_eq!(sync.step(7), 0);
        assert_eq!(sync.step(7), 7);
        assert_eq!(sync.value(), 7);
    }

    #[test]
    fn test_level_relay_settles_after_two_steps() {
        let (source, mut sink) = level_relay(false);
        source.set(true);
        assert!(source.get());

        assert!(!sink.step());
        assert!(sink.step());
        assert!(sink.get());

        source.set(false);
        assert!(sink.step());
        assert!(!sink.step());
    }

    #[test]
    fn test_pulse_relay_one_event_per_fire() {
        let (mut sender, mut receiver) = pulse_relay();

        // Idle receiver never fires
        for _ in 0..10 {
            assert!(!receiver.step());
        }

        for event in 1..=5u64 {
            sender.fire();
            let fired: usize = (0..6).filter(|_| receiver.step()).count();
            assert_eq!(fired, 1, "event {event} must decode exactly once");
            assert_eq!(receiver.received(), event);
        }
    }

    #[test]
    fn test_pulse_relay_spaced_events_from_fast_sender() {
        // Sender fires once per receiver round trip: no drops, no duplicates.
        let (mut sender, mut receiver) = pulse_relay();
        let spacing = crate::SETTLE_STEPS + 1;
        let events = 20;
        let mut decoded = 0;

        for _ in 0..events {
            sender.fire();
            for _ in 0..spacing {
                if receiver.step() {
                    decoded += 1;
                }
            }
        }

        assert_eq!(decoded, events);
    }

    #[test]
    fn test_pulse_relay_back_to_back_events_cancel() {
        let (mut sender, mut receiver) = pulse_relay();
        sender.fire();
        sender.fire();

        let fired = (0..6).filter(|_| receiver.step()).count();
        assert_eq!(fired, 0);
    }

    #[test]
    fn test_reset_asserts_immediately_releases_after_two_steps() {
        let (source, line) = reset_line();
        let mut sync = line.synchronizer();
        assert!(source.is_asserted());

        assert!(sync.step());
        source.release();
        assert!(!source.is_asserted());
        assert!(sync.step());
        assert!(!sync.step());
        assert!(!sync.is_asserted());

        source.assert();
        assert!(sync.step());
    }

    #[test]
    fn test_reset_glitch_does_not_release_early() {
        let (source, line) = reset_line();
        let mut sync = line.synchronizer();

        source.release();
        assert!(sync.step());
        source.assert();
        assert!(sync.step());
        source.release();
        assert!(sync.step());
        assert!(!sync.step());
    }
}
