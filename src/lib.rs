//! # Spectrum DAQ Core Library
//!
//! This crate is the data-movement and control core of a spectrum acquisition
//! pipeline. A fast context drives a signal chain and fills a bounded queue on
//! request; a slow context speaks a two-command byte protocol to an external
//! host and streams the queue back, four bytes per word.
//!
//! ## Crate Structure
//!
//! - **`daq_fifo`** (workspace crate): relay primitives, dual-port storage and
//!   the cross-context queue built from them.
//! - **`controller`**: the acquisition and host-protocol state machines plus
//!   the edge-triggered command decoder.
//! - **`data`**: collaborators upstream of the queue, the waveform tables and
//!   the signal chains (`FftChain`, `PassThrough`).
//! - **`hardware`**: the `ByteLink` transport contract and its adapters for
//!   async streams, in-memory tests and serial ports.
//! - **`device`**: runs each controller as its own tokio task and exposes
//!   start, reset, status and shutdown.
//! - **`client`**: the host side of the protocol, with CSV export.
//! - **`config`**: Figment-based layered configuration.
//! - **`error`**: the `DaqError` enum used across the crate.
//! - **`logging`**: tracing subscriber setup.
//! - **`sample`**: the 32-bit sample word and the command bytes.

pub mod client;
pub mod config;
pub mod controller;
pub mod data;
pub mod device;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod sample;

pub use daq_fifo;
