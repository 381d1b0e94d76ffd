//! Serial port transport.
//!
//! Requires the `serial` feature:
//!
//! ```toml
//! [dependencies]
//! spectrum-daq = { version = "0.1", features = ["serial"] }
//! ```
//!
//! The opened port is an ordinary `AsyncRead + AsyncWrite` stream, handed to
//! [`LinkEndpoint::serve`](super::stream_link::LinkEndpoint::serve) on the
//! device side or to [`HostClient`](crate::client::HostClient) on the host side.

use crate::error::{AppResult, DaqError};
use tokio::task::spawn_blocking;
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

pub use tokio_serial::SerialStream;

/// Open a serial port asynchronously using spawn_blocking.
///
/// Standard settings are applied: 8N1, no flow control.
///
/// # Errors
///
/// Returns [`DaqError::Serial`] if the port cannot be opened or the blocking
/// task fails.
pub async fn open_serial(port_path: &str, baud_rate: u32) -> AppResult<SerialStream> {
    let port_path_owned = port_path.to_string();

    let port = spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                DaqError::Serial(format!(
                    "Failed to open serial port {}: {}",
                    port_path_owned, e
                ))
            })
    })
    .await
    .map_err(|e| DaqError::Serial(format!("spawn_blocking for serial port opening failed: {}", e)))??;

    info!(port = port_path, baud_rate, "serial port open");
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_port_is_serial_error() {
        let err = open_serial("/dev/spectrum-daq-does-not-exist", 230_400)
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::Serial(_)));
        assert!(err.to_string().contains("does-not-exist"));
    }
}
