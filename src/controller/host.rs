//! Host-protocol controller, the consumer side of the sample queue.
//!
//! Decodes FILL and READ_STREAM from the transport, forwards FILL to the
//! acquisition context as a fill trigger, and answers READ_STREAM by draining
//! the queue one word at a time, least-significant byte first. The stream ends
//! when the queue is observed empty; nothing marks the end on the wire.
//!
//! A FILL that arrives while a stream is still in progress is held and
//! forwarded as soon as the stream ends. The host may send it the moment it
//! has seen the last byte, which is before the controller is back in
//! WAIT_FILL_CMD.

use super::command::CommandDecoder;
use crate::hardware::link::ByteLink;
use crate::sample::{Command, Sample};
use daq_fifo::{Consumer, PulseSender, ResetSync};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Host controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    /// Waiting for FILL
    #[default]
    WaitFillCmd,
    /// FILL forwarded, waiting for READ_STREAM
    WaitReadCmd,
    /// Fetching the next word, or ending the stream
    ReadWord,
    /// Waiting for the transmitter to go idle
    SendByte,
    /// Waiting for the current byte to finish
    WaitByteSent,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostState::WaitFillCmd => "WAIT_FILL_CMD",
            HostState::WaitReadCmd => "WAIT_READ_CMD",
            HostState::ReadWord => "READ_WORD",
            HostState::SendByte => "SEND_BYTE",
            HostState::WaitByteSent => "WAIT_BYTE_SENT",
        };
        f.write_str(name)
    }
}

/// Counters kept by the host controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HostStats {
    /// FILL commands forwarded
    pub fills: u64,
    /// READ_STREAM commands answered
    pub streams: u64,
    /// Words fully sent
    pub words_streamed: u64,
    /// Bytes fully sent
    pub bytes_sent: u64,
    /// Commands received in a state that does not accept them
    pub ignored: u64,
}

/// Consumer-context endpoints the controller owns.
#[derive(Debug)]
pub struct HostPorts {
    /// Reading end of the sample queue
    pub consumer: Consumer,
    /// Fill trigger towards the acquisition context
    pub fill_trigger: PulseSender,
    /// Local reset synchronizer
    pub reset: ResetSync,
}

/// Consumer-side state machine.
#[derive(Debug)]
pub struct HostController {
    ports: HostPorts,
    decoder: CommandDecoder,
    state: HostState,
    word: [u8; 4],
    byte_index: usize,
    stream_words: u64,
    stats: HostStats,
    in_reset: bool,
    held_fill: bool,
}

impl HostController {
    /// Create a controller in WAIT_FILL_CMD.
    pub fn new(ports: HostPorts) -> Self {
        Self {
            ports,
            decoder: CommandDecoder::new(),
            state: HostState::WaitFillCmd,
            word: [0; 4],
            byte_index: 0,
            stream_words: 0,
            stats: HostStats::default(),
            in_reset: false,
            held_fill: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> HostState {
        self.state
    }

    /// Counters since the last reset.
    pub fn stats(&self) -> HostStats {
        self.stats
    }

    /// Whether the context is held in reset.
    pub fn in_reset(&self) -> bool {
        self.in_reset
    }

    /// Run one host-context step against `link`.
    pub fn step<L: ByteLink + ?Sized>(&mut self, link: &mut L) -> HostState {
        let in_reset = self.ports.reset.step();
        let rx = link.poll_rx();
        let tx_done = link.poll_tx_done();
        let command = self.decoder.step(rx);

        if in_reset {
            if !self.in_reset {
                self.enter_reset();
            }
            return self.state;
        }
        if self.in_reset {
            debug!("host context out of reset");
            self.in_reset = false;
        }

        self.ports.consumer.tick();

        match self.state {
            HostState::WaitFillCmd => match command {
                Some(Command::Fill) => self.forward_fill(),
                Some(other) => self.ignore(other),
                None => {}
            },
            HostState::WaitReadCmd => match command {
                Some(Command::ReadStream) => {
                    self.stats.streams += 1;
                    self.stream_words = 0;
                    self.transition(HostState::ReadWord);
                }
                Some(other) => self.ignore(other),
                None => {}
            },
            HostState::ReadWord => {
                if let Some(command) = command {
                    self.hold_or_ignore(command);
                }
                match self.ports.consumer.read() {
                    Some(word) => {
                        self.word = Sample(word).to_le_bytes();
                        self.byte_index = 0;
                        // Per-word and per-byte states are not logged
                        self.state = HostState::SendByte;
                    }
                    None => {
                        info!(words = self.stream_words, "stream complete, queue empty");
                        self.transition(HostState::WaitFillCmd);
                        if std::mem::take(&mut self.held_fill) {
                            self.forward_fill();
                        }
                    }
                }
            }
            HostState::SendByte => {
                if let Some(command) = command {
                    self.hold_or_ignore(command);
                }
                if !link.tx_busy() {
                    link.start_tx(self.word[self.byte_index]);
                    self.state = HostState::WaitByteSent;
                }
            }
            HostState::WaitByteSent => {
                if let Some(command) = command {
                    self.hold_or_ignore(command);
                }
                if tx_done {
                    self.stats.bytes_sent += 1;
                    self.byte_index += 1;
                    if self.byte_index == self.word.len() {
                        self.stats.words_streamed += 1;
                        self.stream_words += 1;
                        self.state = HostState::ReadWord;
                    } else {
                        self.state = HostState::SendByte;
                    }
                }
            }
        }

        self.state
    }

    fn forward_fill(&mut self) {
        self.ports.fill_trigger.fire();
        self.stats.fills += 1;
        self.transition(HostState::WaitReadCmd);
    }

    /// Streaming states hold one FILL for when the stream ends.
    fn hold_or_ignore(&mut self, command: Command) {
        if command == Command::Fill && !self.held_fill {
            debug!(state = %self.state, "FILL held until the stream ends");
            self.held_fill = true;
        } else {
            self.ignore(command);
        }
    }

    fn ignore(&mut self, command: Command) {
        self.stats.ignored += 1;
        debug!(%command, state = %self.state, "command ignored in this state");
    }

    fn enter_reset(&mut self) {
        debug!(state = %self.state, "host context entering reset");
        self.in_reset = true;
        self.held_fill = false;
        self.state = HostState::WaitFillCmd;
        self.byte_index = 0;
        self.stream_words = 0;
        self.stats = HostStats::default();
        self.decoder.reset();
        self.ports.consumer.reset();
    }

    fn transition(&mut self, next: HostState) {
        debug!(from = %self.state, to = %next, "host state change");
        self.state = next;
    }
}
