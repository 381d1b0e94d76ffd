//! Upstream collaborators of the acquisition core: the waveform source and
//! the signal chain it feeds.
pub mod fft;
pub mod processor;
pub mod waveform;
