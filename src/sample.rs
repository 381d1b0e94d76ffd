//! Shared types: the 32-bit sample word and the host command set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-width result word moved from the fast context to the host.
///
/// The acquisition core never looks inside it. Results of the transform stage
/// happen to pack a complex value as two signed 16-bit halves (real part in the
/// low half, imaginary part in the high half); [`Sample::re`] and
/// [`Sample::im`] decode that packing on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample(pub u32);

impl Sample {
    /// Pack a complex value.
    pub fn from_complex(re: i16, im: i16) -> Self {
        Sample(u32::from(re as u16) | (u32::from(im as u16) << 16))
    }

    /// Raw word.
    pub fn word(self) -> u32 {
        self.0
    }

    /// Wire order: least-significant byte first.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Inverse of [`Sample::to_le_bytes`].
    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Sample(u32::from_le_bytes(bytes))
    }

    /// Signed real part (bytes 0 and 1 on the wire).
    pub fn re(self) -> i16 {
        (self.0 & 0xFFFF) as u16 as i16
    }

    /// Signed imaginary part (bytes 2 and 3 on the wire).
    pub fn im(self) -> i16 {
        (self.0 >> 16) as u16 as i16
    }

    /// Magnitude of the packed complex value.
    pub fn magnitude(self) -> f64 {
        f64::from(self.re()).hypot(f64::from(self.im()))
    }
}

impl From<u32> for Sample {
    fn from(word: u32) -> Self {
        Sample(word)
    }
}

impl From<Sample> for u32 {
    fn from(sample: Sample) -> Self {
        sample.0
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Single-byte host commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Route the next results into the queue until it is full. No reply.
    Fill = 0x5A,
    /// Stream the queue contents, four bytes per word, until it is empty.
    ReadStream = 0xA5,
}

impl Command {
    /// Decode a received byte; `None` for anything that is not a command.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x5A => Some(Command::Fill),
            0xA5 => Some(Command::ReadStream),
            _ => None,
        }
    }

    /// Wire encoding.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Command::from_byte(byte).ok_or(byte)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Fill => write!(f, "FILL"),
            Command::ReadStream => write!(f, "READ_STREAM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_order_is_little_endian() {
        let sample = Sample(0x1122_3344);
        assert_eq!(sample.to_le_bytes(), [0x44, 0x33, 0x22, 0x11]);
        assert_eq!(Sample::from_le_bytes([0x44, 0x33, 0x22, 0x11]), sample);
    }

    #[test]
    fn test_complex_packing() {
        let sample = Sample::from_complex(-3, 4);
        assert_eq!(sample.re(), -3);
        assert_eq!(sample.im(), 4);
        assert!((sample.magnitude() - 5.0).abs() < 1e-12);

        // Real part occupies the first two wire bytes
        let bytes = sample.to_le_bytes();
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), -3);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 4);
    }

    #[test]
    fn test_command_decode() {
        assert_eq!(Command::from_byte(0x5A), Some(Command::Fill));
        assert_eq!(Command::from_byte(0xA5), Some(Command::ReadStream));
        assert_eq!(Command::from_byte(0x00), None);
        assert_eq!(Command::try_from(0x42), Err(0x42));
        assert_eq!(Command::ReadStream.as_byte(), 0xA5);
        assert_eq!(Command::Fill.to_string(), "FILL");
    }
}
