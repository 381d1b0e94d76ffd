//! Acquisition controller, the producer side of the sample queue.
//!
//! Keeps the upstream chain running once started and, on each fill trigger
//! relayed from the host context, routes results into the queue until it
//! reports full. Results that arrive while the queue is full are dropped.

use crate::data::processor::SignalChain;
use crate::data::waveform::SampleSource;
use daq_fifo::{LevelSink, Producer, PulseReceiver, ResetSync};
use serde::Serialize;
use std::fmt;
use tracing::{debug, trace};

/// Acquisition controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    /// Waiting for start; the chain is halted
    #[default]
    Idle,
    /// Chain running, results discarded
    Acquiring,
    /// Chain running, results written to the queue
    Filling,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Idle => "IDLE",
            AcquisitionState::Acquiring => "ACQUIRING",
            AcquisitionState::Filling => "FILLING",
        };
        f.write_str(name)
    }
}

/// Counters kept by the acquisition controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AcquisitionStats {
    /// Words written into the queue
    pub written: u64,
    /// Results discarded in FILLING because the queue was full
    pub dropped: u64,
    /// Fill triggers received
    pub triggers: u64,
    /// Fill phases entered
    pub fills: u64,
}

/// Producer-context endpoints the controller owns.
#[derive(Debug)]
pub struct AcquisitionPorts {
    /// Writing end of the sample queue
    pub producer: Producer,
    /// Fill trigger from the host context
    pub fill_trigger: PulseReceiver,
    /// External start level
    pub start: LevelSink,
    /// Local reset synchronizer
    pub reset: ResetSync,
}

/// Producer-side state machine.
pub struct AcquisitionController<S, C> {
    ports: AcquisitionPorts,
    source: S,
    chain: C,
    state: AcquisitionState,
    stats: AcquisitionStats,
    in_reset: bool,
    fill_dropped: u64,
}

impl<S: SampleSource, C: SignalChain> AcquisitionController<S, C> {
    /// Create a controller in IDLE.
    pub fn new(ports: AcquisitionPorts, source: S, chain: C) -> Self {
        Self {
            ports,
            source,
            chain,
            state: AcquisitionState::Idle,
            stats: AcquisitionStats::default(),
            in_reset: false,
            fill_dropped: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Counters since the last reset.
    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    /// Whether the context is held in reset.
    pub fn in_reset(&self) -> bool {
        self.in_reset
    }

    /// Whether the upstream chain is being driven ("go").
    pub fn is_active(&self) -> bool {
        self.state != AcquisitionState::Idle
    }

    /// Run one producer-context step.
    pub fn step(&mut self) -> AcquisitionState {
        let in_reset = self.ports.reset.step();
        // Relays keep sampling during reset so stale edges do not replay later
        let start = self.ports.start.step();
        let trigger = self.ports.fill_trigger.step();

        if in_reset {
            if !self.in_reset {
                self.enter_reset();
            }
            return self.state;
        }
        if self.in_reset {
            debug!("acquisition context out of reset");
            self.in_reset = false;
        }

        self.ports.producer.tick();
        if trigger {
            self.stats.triggers += 1;
        }

        if self.is_active() && self.chain.ready() {
            self.chain.push(self.source.next_sample());
        }
        let result = self.chain.poll();

        match self.state {
            AcquisitionState::Idle => {
                if trigger {
                    debug!("fill trigger ignored while idle");
                }
                if start {
                    self.transition(AcquisitionState::Acquiring);
                }
            }
            AcquisitionState::Acquiring => {
                if trigger {
                    self.stats.fills += 1;
                    self.fill_dropped = 0;
                    self.transition(AcquisitionState::Filling);
                }
            }
            AcquisitionState::Filling => {
                if trigger {
                    debug!("fill trigger ignored while filling");
                }
                if let Some(sample) = result {
                    if self.ports.producer.write(sample.word()) {
                        self.stats.written += 1;
                    } else {
                        self.stats.dropped += 1;
                        self.fill_dropped += 1;
                        trace!(word = %sample, "result dropped, queue full");
                    }
                }
                if self.ports.producer.is_full() {
                    debug!(
                        written = self.stats.written,
                        dropped = self.fill_dropped,
                        "fill complete, queue full"
                    );
                    self.transition(AcquisitionState::Acquiring);
                }
            }
        }

        self.state
    }

    fn enter_reset(&mut self) {
        debug!(state = %self.state, "acquisition context entering reset");
        self.in_reset = true;
        self.state = AcquisitionState::Idle;
        self.stats = AcquisitionStats::default();
        self.fill_dropped = 0;
        self.ports.producer.reset();
        self.chain.reset();
        self.source.rewind();
    }

    fn transition(&mut self, next: AcquisitionState) {
        debug!(from = %self.state, to = %next, "acquisition state change");
        self.state = next;
    }
}

impl<S, C> fmt::Debug for AcquisitionController<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionController")
            .field("state", &self.state)
            .field("stats", &self.stats)
            .field("in_reset", &self.in_reset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::processor::PassThrough;
    use daq_fifo::{
        channel, level_relay, pulse_relay, reset_line, Consumer, LevelSource, PulseSender,
    };
    use tracing_test::traced_test;

    struct Counter(i16);

    impl SampleSource for Counter {
        fn next_sample(&mut self) -> i16 {
            self.0 += 1;
            self.0
        }

        fn rewind(&mut self) {
            self.0 = 0;
        }
    }

    struct Rig {
        controller: AcquisitionController<Counter, PassThrough>,
        consumer: Consumer,
        trigger: PulseSender,
        start: LevelSource,
    }

    fn rig(capacity: usize, auto_start: bool) -> Rig {
        let (producer, consumer) = channel(capacity).unwrap();
        let (trigger, fill_trigger) = pulse_relay();
        let (start, start_sink) = level_relay(auto_start);
        let (reset_source, line) = reset_line();
        let ports = AcquisitionPorts {
            producer,
            fill_trigger,
            start: start_sink,
            reset: line.synchronizer(),
        };
        reset_source.release();

        Rig {
            controller: AcquisitionController::new(ports, Counter(0), PassThrough::new()),
            consumer,
            trigger,
            start,
        }
    }

    fn step_until(rig: &mut Rig, state: AcquisitionState, limit: usize) {
        for _ in 0..limit {
            if rig.controller.step() == state {
                return;
            }
        }
        panic!("controller never reached {state}");
    }

    fn drain(consumer: &mut Consumer) -> Vec<u32> {
        consumer.settle();
        std::iter::from_fn(|| consumer.read()).collect()
    }

    #[test]
    #[traced_test]
    fn test_fill_writes_consecutive_results_until_full() {
        let mut rig = rig(8, true);
        step_until(&mut rig, AcquisitionState::Acquiring, 5);

        rig.trigger.fire();
        step_until(&mut rig, AcquisitionState::Filling, 5);
        step_until(&mut rig, AcquisitionState::Acquiring, 20);

        let words = drain(&mut rig.consumer);
        assert_eq!(words.len(), 8);
        assert!(words.windows(2).all(|w| w[1] == w[0] + 1));

        let stats = rig.controller.stats();
        assert_eq!(stats.written, 8);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.fills, 1);
        assert!(logs_contain("fill complete"));
    }

    #[test]
    fn test_trigger_while_idle_is_ignored() {
        let mut rig = rig(4, false);
        rig.trigger.fire();
        for _ in 0..6 {
            assert_eq!(rig.controller.step(), AcquisitionState::Idle);
        }
        assert_eq!(rig.controller.stats().triggers, 1);
        assert!(!rig.controller.is_active());

        rig.start.set(true);
        step_until(&mut rig, AcquisitionState::Acquiring, 4);
        for _ in 0..10 {
            assert_eq!(rig.controller.step(), AcquisitionState::Acquiring);
        }
        assert!(drain(&mut rig.consumer).is_empty());
    }

    #[test]
    fn test_fill_on_full_queue_drops_and_keeps_contents() {
        let mut rig = rig(4, true);
        step_until(&mut rig, AcquisitionState::Acquiring, 5);
        rig.trigger.fire();
        step_until(&mut rig, AcquisitionState::Filling, 5);
        step_until(&mut rig, AcquisitionState::Acquiring, 10);

        // Second fill before the host drained anything
        rig.trigger.fire();
        step_until(&mut rig, AcquisitionState::Filling, 5);
        step_until(&mut rig, AcquisitionState::Acquiring, 10);

        let stats = rig.controller.stats();
        assert_eq!(stats.written, 4);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.fills, 2);

        let words = drain(&mut rig.consumer);
        assert_eq!(words.len(), 4);
        assert!(words.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn test_spaced_triggers_each_start_one_fill() {
        let mut rig = rig(2, true);
        step_until(&mut rig, AcquisitionState::Acquiring, 5);

        for round in 1..=5u64 {
            rig.trigger.fire();
            step_until(&mut rig, AcquisitionState::Filling, 5);
            step_until(&mut rig, AcquisitionState::Acquiring, 10);
            assert_eq!(drain(&mut rig.consumer).len(), 2);
            rig.controller.step();
            rig.controller.step();
            assert_eq!(rig.controller.stats().fills, round);
        }
        assert_eq!(rig.controller.stats().triggers, 5);
    }
}
