//! Waveform lookup tables feeding the signal chain.
//!
//! A table holds one period of a test signal, quantized to signed 16-bit words
//! in a 14-bit range, and is read back cyclically by the acquisition controller
//! while it keeps the chain running.
//!
//! Two shapes are available:
//! - [`Waveform::Sine`]: a single 25 MHz tone
//! - [`Waveform::Square`]: ten odd harmonics (amplitude `GAIN / m`) of a
//!   fundamental whose period spans the whole table
//!
//! Tables can be written as hex ROM initialization files, one 16-bit
//! big-endian two's-complement word per line.

use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::io::Write;
use std::sync::Arc;

/// Table address width in bits.
pub const ADDRESS_BITS: u32 = 9;

/// Entries per table.
pub const TABLE_LEN: usize = 1 << ADDRESS_BITS;

/// Peak amplitude of the fundamental.
pub const GAIN: f64 = 80.0;

/// Quantization width in bits.
pub const QUANT_BITS: u32 = 14;

const SINE_TONE_HZ: f64 = 25e6;
const SQUARE_HARMONICS: usize = 10;

/// Test signal shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    /// 25 MHz sine tone
    #[default]
    Sine,
    /// Band-limited square wave over the full table
    Square,
}

impl std::str::FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sine" | "sin" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            other => Err(format!("unknown waveform '{other}' (expected sine or square)")),
        }
    }
}

/// One period of a quantized test signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomTable {
    words: Arc<[i16]>,
}

impl RomTable {
    /// Generate a table for `waveform` sampled at `sampling_hz`.
    pub fn generate(waveform: Waveform, sampling_hz: f64) -> Self {
        let period = 1.0 / sampling_hz;
        let (tone_hz, harmonics) = match waveform {
            Waveform::Sine => (SINE_TONE_HZ, 1),
            Waveform::Square => (1.0 / (TABLE_LEN as f64 * period), SQUARE_HARMONICS),
        };

        let v_min = -(1i32 << (QUANT_BITS - 1));
        let v_max = (1i32 << (QUANT_BITS - 1)) - 1;

        // Time base accumulates the period, one step per entry
        let mut t = 0.0;
        let words = (0..TABLE_LEN)
            .map(|i| {
                if i > 0 {
                    t += period;
                }
                let value: f64 = (0..harmonics)
                    .map(|h| {
                        let m = (2 * h + 1) as f64;
                        (GAIN / m) * (2.0 * PI * m * tone_hz * t).sin()
                    })
                    .sum();
                (value.trunc() as i32).clamp(v_min, v_max) as i16
            })
            .collect();

        Self { words }
    }

    /// Build a table from raw words.
    pub fn from_words(words: impl Into<Arc<[i16]>>) -> Self {
        Self {
            words: words.into(),
        }
    }

    /// Table entries.
    pub fn words(&self) -> &[i16] {
        &self.words
    }

    /// Write one `xxxx` hex line per entry.
    pub fn write_hex<W: Write>(&self, mut writer: W) -> AppResult<()> {
        for word in self.words.iter() {
            let [hi, lo] = word.to_be_bytes();
            writeln!(writer, "{hi:02x}{lo:02x}")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Cyclic reader starting at address 0.
    pub fn reader(&self) -> RomReader {
        RomReader {
            table: self.clone(),
            address: 0,
        }
    }
}

/// Source of input samples for the signal chain.
pub trait SampleSource: Send {
    /// Next input sample.
    fn next_sample(&mut self) -> i16;

    /// Return to the first sample.
    fn rewind(&mut self) {}
}

impl<F> SampleSource for F
where
    F: FnMut() -> i16 + Send,
{
    fn next_sample(&mut self) -> i16 {
        self()
    }
}

/// Address counter walking a [`RomTable`] and wrapping at the end.
#[derive(Debug, Clone)]
pub struct RomReader {
    table: RomTable,
    address: usize,
}

impl RomReader {
    /// Current address.
    pub fn address(&self) -> usize {
        self.address
    }
}

impl SampleSource for RomReader {
    fn next_sample(&mut self) -> i16 {
        let words = self.table.words();
        if words.is_empty() {
            return 0;
        }
        let sample = words[self.address];
        self.address = (self.address + 1) % words.len();
        sample
    }

    fn rewind(&mut self) {
        self.address = 0;
    }
}
