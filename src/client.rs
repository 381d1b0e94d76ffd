//! Host side of the byte protocol.
//!
//! [`HostClient`] plays the external host against any async byte stream: it
//! sends FILL, gives the device time to fill its queue, sends READ_STREAM and
//! collects a known number of words. The wire carries no length and no
//! terminator, so every read is bounded by a byte count and a timeout.
//!
//! # Example
//! ```no_run
//! use spectrum_daq::client::{write_csv, HostClient};
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> spectrum_daq::error::AppResult<()> {
//! let stream = TcpStream::connect("127.0.0.1:5025").await?;
//! let mut client = HostClient::new(stream);
//! let samples = client.acquire(512).await?;
//! write_csv(std::io::stdout(), &samples, 195_312.5)?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, DaqError};
use crate::sample::{Command, Sample};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default wait between FILL and READ_STREAM.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(50);

/// Default bound on a whole READ_STREAM transfer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`HostClient::drain`] listens for stale bytes.
const DRAIN_WINDOW: Duration = Duration::from_millis(20);

/// Client for the FILL / READ_STREAM protocol.
#[derive(Debug)]
pub struct HostClient<S> {
    stream: S,
    settle: Duration,
    timeout: Duration,
}

impl<S> HostClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            settle: DEFAULT_SETTLE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the wait between FILL and READ_STREAM.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Set the bound on a READ_STREAM transfer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Send FILL. The device does not acknowledge it.
    pub async fn fill(&mut self) -> AppResult<()> {
        self.send_command(Command::Fill).await
    }

    /// Send READ_STREAM and collect exactly `words` words.
    ///
    /// # Errors
    ///
    /// [`DaqError::Timeout`] if nothing arrives before the deadline,
    /// [`DaqError::ShortRead`] if the stream ends or stalls part way.
    pub async fn read_stream(&mut self, words: usize) -> AppResult<Vec<Sample>> {
        self.send_command(Command::ReadStream).await?;

        let expected = words * 4;
        let mut bytes = vec![0u8; expected];
        let mut received = 0;
        let deadline = Instant::now() + self.timeout;

        while received < expected {
            let read = tokio::time::timeout_at(deadline, self.stream.read(&mut bytes[received..]));
            match read.await {
                Ok(Ok(0)) => {
                    warn!(expected, received, "stream closed mid-transfer");
                    return Err(DaqError::ShortRead { expected, received });
                }
                Ok(Ok(n)) => received += n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) if received == 0 => {
                    return Err(DaqError::Timeout {
                        what: "READ_STREAM data".to_string(),
                        elapsed_ms: self.timeout.as_millis() as u64,
                    });
                }
                Err(_) => {
                    warn!(expected, received, "stream stalled mid-transfer");
                    return Err(DaqError::ShortRead { expected, received });
                }
            }
        }

        debug!(words, "stream received");
        Ok(decode_words(&bytes))
    }

    /// Full acquisition: discard stale input, FILL, wait, READ_STREAM.
    pub async fn acquire(&mut self, words: usize) -> AppResult<Vec<Sample>> {
        let stale = self.drain().await;
        if stale > 0 {
            debug!(bytes = stale, "discarded stale bytes before acquisition");
        }

        self.fill().await?;
        tokio::time::sleep(self.settle).await;
        let samples = self.read_stream(words).await?;
        info!(words = samples.len(), "acquisition complete");
        Ok(samples)
    }

    /// Read and discard whatever arrives within a short window.
    ///
    /// Returns the number of bytes discarded.
    pub async fn drain(&mut self) -> usize {
        let mut discard = [0u8; 256];
        let deadline = Instant::now() + DRAIN_WINDOW;
        let mut total_discarded = 0usize;

        loop {
            match tokio::time::timeout_at(deadline, self.stream.read(&mut discard)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => total_discarded += n,
                Ok(Err(_)) => break,
                Err(_) => break,
            }
        }

        total_discarded
    }

    async fn send_command(&mut self, command: Command) -> AppResult<()> {
        debug!(%command, "sending command");
        self.stream.write_all(&[command.as_byte()]).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Split a byte stream into little-endian words. A trailing partial word is
/// ignored.
pub fn decode_words(bytes: &[u8]) -> Vec<Sample> {
    bytes
        .chunks_exact(4)
        .map(|chunk| Sample::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[derive(Debug, Serialize)]
struct SpectrumRow {
    index: usize,
    frequency_hz: f64,
    re: i16,
    im: i16,
    magnitude: f64,
}

/// Write samples as CSV rows of `index,frequency_hz,re,im,magnitude`, with
/// `bin_hz` the frequency step between consecutive samples.
pub fn write_csv<W: Write>(writer: W, samples: &[Sample], bin_hz: f64) -> AppResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for (index, sample) in samples.iter().enumerate() {
        writer.serialize(SpectrumRow {
            index,
            frequency_hz: index as f64 * bin_hz,
            re: sample.re(),
            im: sample.im(),
            magnitude: sample.magnitude(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_stream_decodes_little_endian_words() {
        let stream = Builder::new()
            .write(&[0xA5])
            .read(&[0x01, 0x00, 0x02])
            .read(&[0x00, 0xFF, 0xFF, 0x00, 0x80])
            .build();

        let mut client = HostClient::new(stream);
        let samples = client.read_stream(2).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].re(), 1);
        assert_eq!(samples[0].im(), 2);
        assert_eq!(samples[1].re(), -1);
        assert_eq!(samples[1].im(), i16::MIN);
    }

    #[tokio::test]
    async fn test_fill_sends_single_byte() {
        let stream = Builder::new().write(&[0x5A]).build();
        let mut client = HostClient::new(stream);
        client.fill().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_closed_early_is_short_read() {
        let stream = Builder::new().write(&[0xA5]).read(&[1, 2, 3, 4, 5]).build();
        let mut client = HostClient::new(stream);
        let err = client.read_stream(4).await.unwrap_err();
        assert!(matches!(
            err,
            DaqError::ShortRead {
                expected: 16,
                received: 5
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let (client_side, _device_side) = tokio::io::duplex(64);
        let mut client = HostClient::new(client_side).with_timeout(Duration::from_millis(100));
        let err = client.read_stream(1).await.unwrap_err();
        assert!(matches!(err, DaqError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_decode_ignores_partial_word() {
        let samples = decode_words(&[1, 0, 0, 0, 2, 0, 0, 0, 9]);
        assert_eq!(samples, vec![Sample(1), Sample(2)]);
    }

    #[test]
    fn test_write_csv_rows() {
        let samples = [Sample::from_complex(3, 4), Sample::from_complex(-1, 0)];
        let mut out = Vec::new();
        write_csv(&mut out, &samples, 0.5).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "index,frequency_hz,re,im,magnitude");
        assert_eq!(lines[1], "0,0.0,3,4,5.0");
        assert_eq!(lines[2], "1,0.5,-1,0,1.0");
    }
}
