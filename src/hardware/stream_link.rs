//! Async byte streams as a [`ByteLink`].
//!
//! [`stream_link`] creates two halves joined by bounded channels:
//!
//! - [`StreamLink`] is stepped synchronously by the host controller
//! - [`LinkEndpoint`] pumps bytes between the channels and any
//!   `AsyncRead + AsyncWrite` stream (TCP socket, serial port, duplex pipe)
//!
//! The endpoint outlives individual connections, so a server can hand it one
//! accepted socket after another.

use super::link::{ByteLink, RxGap, TxTimer};
use crate::error::AppResult;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const CHANNEL_DEPTH: usize = 256;
const READ_CHUNK: usize = 64;

/// Create a connected link/endpoint pair.
pub fn stream_link(tx_frame_steps: u32) -> (StreamLink, LinkEndpoint) {
    let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_DEPTH);
    (
        StreamLink {
            inbound: inbound_rx,
            outbound: outbound_tx,
            rx: RxGap::default(),
            tx: TxTimer::new(tx_frame_steps),
            peer_gone: false,
        },
        LinkEndpoint {
            inbound: inbound_tx,
            outbound: outbound_rx,
        },
    )
}

/// Controller-facing half of a stream link.
#[derive(Debug)]
pub struct StreamLink {
    inbound: mpsc::Receiver<u8>,
    outbound: mpsc::Sender<u8>,
    rx: RxGap,
    tx: TxTimer,
    peer_gone: bool,
}

impl ByteLink for StreamLink {
    fn poll_rx(&mut self) -> Option<u8> {
        let inbound = &mut self.inbound;
        self.rx.poll(|| inbound.try_recv().ok())
    }

    fn tx_busy(&self) -> bool {
        // Outbound backpressure holds the transmitter busy
        self.tx.busy() || (self.outbound.capacity() == 0 && !self.outbound.is_closed())
    }

    fn start_tx(&mut self, byte: u8) {
        if let Err(err) = self.outbound.try_send(byte) {
            if !self.peer_gone {
                warn!(error = %err, "link endpoint gone, discarding outbound bytes");
                self.peer_gone = true;
            }
        }
        self.tx.start();
    }

    fn poll_tx_done(&mut self) -> bool {
        self.tx.step()
    }
}

/// Stream-facing half of a stream link.
#[derive(Debug)]
pub struct LinkEndpoint {
    inbound: mpsc::Sender<u8>,
    outbound: mpsc::Receiver<u8>,
}

impl LinkEndpoint {
    /// Pump bytes between `stream` and the link until the stream reaches EOF
    /// or the device side is dropped.
    ///
    /// Bytes the device sends while no stream is attached are discarded first,
    /// so a new connection never sees the tail of an earlier stream.
    pub async fn serve<S>(&mut self, stream: S) -> AppResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let stale = self.discard_pending();
        if stale > 0 {
            debug!(bytes = stale, "discarded outbound bytes from a previous connection");
        }

        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buf = [0u8; READ_CHUNK];
        let mut batch = Vec::with_capacity(CHANNEL_DEPTH);

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        debug!("link stream closed by peer");
                        return Ok(());
                    }
                    trace!(bytes = n, "link received");
                    for &byte in &buf[..n] {
                        if self.inbound.send(byte).await.is_err() {
                            debug!("device side of link dropped");
                            return Ok(());
                        }
                    }
                }
                outbound = self.outbound.recv() => {
                    let Some(byte) = outbound else {
                        debug!("device side of link dropped");
                        return Ok(());
                    };
                    batch.clear();
                    batch.push(byte);
                    while let Ok(more) = self.outbound.try_recv() {
                        batch.push(more);
                    }
                    writer.write_all(&batch).await?;
                    writer.flush().await?;
                    trace!(bytes = batch.len(), "link sent");
                }
            }
        }
    }

    fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.outbound.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn step_until_rx(link: &mut StreamLink, limit: usize) -> Option<u8> {
        for _ in 0..limit {
            if let Some(byte) = link.poll_rx() {
                return Some(byte);
            }
            tokio::task::yield_now().await;
        }
        None
    }

    #[tokio::test]
    async fn test_bytes_cross_in_both_directions() {
        let (mut link, mut endpoint) = stream_link(1);
        let (mut host, device) = tokio::io::duplex(64);
        let pump = tokio::spawn(async move { endpoint.serve(device).await });

        host.write_all(&[0x5A, 0xA5]).await.unwrap();
        assert_eq!(step_until_rx(&mut link, 1000).await, Some(0x5A));
        // Idle step between consecutive bytes
        assert_eq!(link.poll_rx(), None);
        assert_eq!(step_until_rx(&mut link, 1000).await, Some(0xA5));

        for byte in [0x01, 0x02, 0x03] {
            assert!(!link.tx_busy());
            link.start_tx(byte);
            assert!(link.tx_busy());
            assert!(link.poll_tx_done());
        }
        let mut echoed = [0u8; 3];
        host.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed, [0x01, 0x02, 0x03]);

        drop(host);
        pump.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_tx_completes_without_peer() {
        let (mut link, endpoint) = stream_link(2);
        drop(endpoint);

        link.start_tx(0xFF);
        assert!(!link.poll_tx_done());
        assert!(link.poll_tx_done());
        assert!(!link.tx_busy());
        assert_eq!(link.poll_rx(), None);
    }
}
