//! Streaming block FFT standing in for the frequency-domain transform core.

use super::processor::SignalChain;
use crate::sample::Sample;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// A [`SignalChain`] that performs a forward FFT on consecutive blocks.
///
/// The chain collects `frame_len` real input samples, transforms them and then
/// emits the `frame_len` complex bins one per step, bin 0 first. While bins are
/// being emitted the chain is not ready for input, mirroring a streaming core
/// that alternates between load and unload phases.
///
/// Each bin is packed into a [`Sample`] with real and imaginary parts rounded
/// and saturated to `i16`. No scaling is applied: with 14-bit inputs and block
/// sizes up to 1024 a pure tone stays within range.
///
/// # Example
///
/// ```
/// use spectrum_daq::data::fft::FftChain;
/// use spectrum_daq::data::processor::SignalChain;
///
/// let mut chain = FftChain::new(8);
/// for _ in 0..8 {
///     assert!(chain.ready());
///     chain.push(1);
/// }
///
/// // DC bin carries the sum of the inputs
/// let dc = chain.poll().unwrap();
/// assert_eq!(dc.re(), 8);
/// assert_eq!(dc.im(), 0);
/// ```
#[derive(Clone)]
pub struct FftChain {
    frame_len: usize,
    input: Vec<Complex<f32>>,
    output: VecDeque<Sample>,
    fft: Arc<dyn Fft<f32>>,
    frames: u64,
}

impl FftChain {
    /// Creates a new `FftChain`.
    ///
    /// # Panics
    /// Panics if `frame_len` is 0.
    pub fn new(frame_len: usize) -> Self {
        assert!(frame_len > 0, "frame length must be greater than 0");

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_len);

        Self {
            frame_len,
            input: Vec::with_capacity(frame_len),
            output: VecDeque::with_capacity(frame_len),
            fft,
            frames: 0,
        }
    }

    /// Block size.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Blocks transformed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn transform(&mut self) {
        self.fft.process(&mut self.input);
        self.output.extend(
            self.input
                .iter()
                .map(|bin| Sample::from_complex(saturate(bin.re), saturate(bin.im))),
        );
        self.input.clear();
        self.frames += 1;
        trace!(frame = self.frames, "transform block complete");
    }
}

fn saturate(value: f32) -> i16 {
    value.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

impl SignalChain for FftChain {
    fn ready(&self) -> bool {
        self.output.is_empty()
    }

    fn push(&mut self, input: i16) {
        self.input.push(Complex::new(f32::from(input), 0.0));
        if self.input.len() == self.frame_len {
            self.transform();
        }
    }

    fn poll(&mut self) -> Option<Sample> {
        self.output.pop_front()
    }

    fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
    }
}

impl std::fmt::Debug for FftChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftChain")
            .field("frame_len", &self.frame_len)
            .field("buffered", &self.input.len())
            .field("pending", &self.output.len())
            .field("frames", &self.frames)
            .finish()
    }
}
