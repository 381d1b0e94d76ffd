//! CLI Entry Point for spectrum-daq
//!
//! Provides command-line interface for:
//! - Running the acquisition device behind a TCP socket or serial port
//! - Acting as the host: FILL, READ_STREAM, decode, save as CSV
//! - Generating waveform ROM files
//!
//! # Usage
//!
//! Run the device:
//! ```bash
//! spectrum-daq serve
//! ```
//!
//! Acquire one queue's worth of transform results:
//! ```bash
//! spectrum-daq acquire --output spectrum.csv
//! ```
//!
//! Write the sine table:
//! ```bash
//! spectrum-daq genrom --waveform sine --output sin.mem
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spectrum_daq::client::{write_csv, HostClient};
use spectrum_daq::config::{AppConfig, TransportKind, DEFAULT_CONFIG_PATH};
use spectrum_daq::data::fft::FftChain;
use spectrum_daq::data::waveform::{RomTable, Waveform};
use spectrum_daq::device::Device;
use spectrum_daq::hardware::{stream_link, LinkEndpoint};
use spectrum_daq::logging;
use spectrum_daq::sample::Sample;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "spectrum-daq")]
#[command(about = "Two-context acquisition core with a FILL / READ_STREAM host protocol", long_about = None)]
struct Cli {
    /// Configuration file (missing file means built-in defaults)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device until Ctrl+C
    Serve,

    /// Act as the host: trigger a fill and read the queue back
    Acquire {
        /// Words to read (defaults to the queue capacity)
        #[arg(long)]
        words: Option<usize>,

        /// Write the result as CSV
        #[arg(long)]
        output: Option<PathBuf>,

        /// Wait between FILL and READ_STREAM in milliseconds
        #[arg(long, default_value = "50")]
        settle_ms: u64,

        /// Bound on the whole transfer in milliseconds
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Write a waveform ROM file, one 16-bit hex word per line
    Genrom {
        /// Waveform (defaults to acquisition.waveform)
        #[arg(long)]
        waveform: Option<Waveform>,

        /// Output file (defaults to stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    config.validate().context("validating configuration")?;
    logging::init_from_config(&config)?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Acquire {
            words,
            output,
            settle_ms,
            timeout_ms,
        } => {
            let words = words.unwrap_or(config.fifo.capacity);
            let settle = Duration::from_millis(settle_ms);
            let timeout = Duration::from_millis(timeout_ms);
            acquire(&config, words, output, settle, timeout).await
        }
        Commands::Genrom { waveform, output } => {
            genrom(&config, waveform.unwrap_or(config.acquisition.waveform), output)
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    println!("🚀 {} - acquisition device", config.application.name);
    println!(
        "   Queue: {} words, transform: {} points, waveform: {:?}",
        config.fifo.capacity, config.acquisition.frame_len, config.acquisition.waveform
    );

    let table = RomTable::generate(config.acquisition.waveform, config.acquisition.sampling_hz());
    let chain = FftChain::new(config.acquisition.frame_len);
    let (link, mut endpoint) = stream_link(config.host.tx_frame_steps);

    let handle = Device::spawn(&config, table.reader(), chain, link)?;

    let served = match config.transport.kind {
        TransportKind::Tcp => serve_tcp(&mut endpoint, &config.transport.address).await,
        TransportKind::Serial => serve_serial(&mut endpoint, &config).await,
    };

    println!("\n👋 Device shutting down...");
    let status = handle.status();
    info!(
        written = status.acquisition.stats.written,
        dropped = status.acquisition.stats.dropped,
        streamed = status.host.stats.words_streamed,
        "final counters"
    );
    handle.shutdown().await?;
    served
}

async fn serve_tcp(endpoint: &mut LinkEndpoint, address: &str) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("binding {}", address))?;
    println!("📡 Listening on {} - Press Ctrl+C to stop", address);

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        info!(%peer, "host connected");
        socket.set_nodelay(true)?;

        tokio::select! {
            result = endpoint.serve(socket) => match result {
                Ok(()) => info!(%peer, "host disconnected"),
                Err(e) => warn!(%peer, error = %e, "host connection failed"),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

#[cfg(feature = "serial")]
async fn serve_serial(endpoint: &mut LinkEndpoint, config: &AppConfig) -> Result<()> {
    use spectrum_daq::hardware::serial::open_serial;

    let Some(path) = config.transport.serial_port.as_deref() else {
        bail!("transport.serial_port is not set");
    };
    let port = open_serial(path, config.transport.baud_rate).await?;
    println!("📡 Serving on {} at {} baud - Press Ctrl+C to stop", path, config.transport.baud_rate);

    tokio::select! {
        result = endpoint.serve(port) => result?,
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
async fn serve_serial(_endpoint: &mut LinkEndpoint, _config: &AppConfig) -> Result<()> {
    bail!("serial transport requires the 'serial' feature (cargo build --features serial)")
}

async fn acquire(
    config: &AppConfig,
    words: usize,
    output: Option<PathBuf>,
    settle: Duration,
    timeout: Duration,
) -> Result<()> {
    let samples = match config.transport.kind {
        TransportKind::Tcp => {
            let stream = TcpStream::connect(&config.transport.address)
                .await
                .with_context(|| format!("connecting to {}", config.transport.address))?;
            stream.set_nodelay(true)?;
            run_acquisition(stream, words, settle, timeout).await?
        }
        TransportKind::Serial => acquire_serial(config, words, settle, timeout).await?,
    };

    print_summary(&samples, config.acquisition.bin_hz());

    if let Some(path) = output {
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        write_csv(BufWriter::new(file), &samples, config.acquisition.bin_hz())?;
        println!("💾 Saved {} rows to {}", samples.len(), path.display());
    }
    Ok(())
}

async fn run_acquisition<S>(
    stream: S,
    words: usize,
    settle: Duration,
    timeout: Duration,
) -> Result<Vec<Sample>>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut client = HostClient::new(stream)
        .with_settle(settle)
        .with_timeout(timeout);
    Ok(client.acquire(words).await?)
}

#[cfg(feature = "serial")]
async fn acquire_serial(
    config: &AppConfig,
    words: usize,
    settle: Duration,
    timeout: Duration,
) -> Result<Vec<Sample>> {
    use spectrum_daq::hardware::serial::open_serial;

    let Some(path) = config.transport.serial_port.as_deref() else {
        bail!("transport.serial_port is not set");
    };
    let port = open_serial(path, config.transport.baud_rate).await?;
    run_acquisition(port, words, settle, timeout).await
}

#[cfg(not(feature = "serial"))]
async fn acquire_serial(
    _config: &AppConfig,
    _words: usize,
    _settle: Duration,
    _timeout: Duration,
) -> Result<Vec<Sample>> {
    bail!("serial transport requires the 'serial' feature (cargo build --features serial)")
}

fn print_summary(samples: &[Sample], bin_hz: f64) {
    println!("✅ Received {} words", samples.len());

    // Only the first half of a real-input spectrum is unique
    let half = (samples.len() / 2).max(1).min(samples.len());
    let peak = samples[..half]
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.magnitude().total_cmp(&b.1.magnitude()));

    if let Some((bin, sample)) = peak {
        println!(
            "   Peak: bin {} ({:.3} MHz), magnitude {:.1}",
            bin,
            bin as f64 * bin_hz / 1e6,
            sample.magnitude()
        );
    }
}

fn genrom(config: &AppConfig, waveform: Waveform, output: Option<PathBuf>) -> Result<()> {
    let table = RomTable::generate(waveform, config.acquisition.sampling_hz());
    match output {
        Some(path) => {
            let file =
                File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            table.write_hex(BufWriter::new(file))?;
            eprintln!("💾 Wrote {} entries to {}", table.words().len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            table.write_hex(&mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}
