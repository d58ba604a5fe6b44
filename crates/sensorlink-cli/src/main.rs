//! Sensorlink gateway binary.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a USB serial gateway, buffer-then-save image assembly
//! sensorlink-cli --port /dev/ttyACM0 --baud 115200
//!
//! # Append-as-received image assembly, verbose logging
//! sensorlink-cli --port /dev/ttyUSB0 --mode streaming --log-level debug
//! ```

use clap::Parser;
use sensorlink_core::AssemblyMode;
use sensorlink_engine::{Dispatcher, supervise};
use sensorlink_sinks::{FilesystemImageSink, InfluxTelemetrySink};
use sensorlink_transport::SerialTransport;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Serial frame gateway for field sensor nodes
#[derive(Parser, Debug)]
#[command(name = "sensorlink-cli")]
#[command(about = "Decodes sensor frames off a serial gateway and fans them out to telemetry/image sinks")]
#[command(version)]
struct Args {
    /// Serial device path
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Serial baud rate
    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    /// Image assembly strategy (legacy = buffer-then-save, streaming = append-as-received)
    #[arg(short, long, default_value = "legacy")]
    mode: AssemblyMode,

    /// Log level (trace, debug, info, warn, error); overridden by RUST_LOG/LOG_LEVEL
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Maximum reconnect backoff, in seconds
    #[arg(long, default_value_t = 30)]
    reconnect_max_backoff: u64,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or(args.log_level.clone());
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));
    if std::env::var("DEBUG_FRAME_PARSING").is_ok() {
        filter = filter.add_directive("sensorlink_protocol=trace".parse().expect("static directive parses"));
    }
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(port = %args.port, baud = args.baud, mode = %args.mode, "sensorlink gateway starting");

    let image_sink = match FilesystemImageSink::from_env() {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            tracing::error!(%err, "failed to initialize filesystem image sink");
            return std::process::ExitCode::from(2);
        }
    };
    let telemetry_sink = InfluxTelemetrySink::from_env();

    let reconnect_max_backoff = std::env::var("SERIAL_RECONNECT_MAX_BACKOFF_S")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(args.reconnect_max_backoff);

    let port = args.port.clone();
    let baud = args.baud;
    let mode = args.mode;

    let run = async {
        supervise(
            move || {
                let port = port.clone();
                async move { SerialTransport::open(&port, baud) }
            },
            move || {
                let (writer_tx, writer_rx) = tokio::sync::mpsc::channel(64);
                let dispatcher = Dispatcher::with_mode(telemetry_sink.clone(), image_sink.clone(), writer_tx, mode);
                (dispatcher, writer_rx)
            },
            reconnect_max_backoff,
        )
        .await;
    };

    tokio::select! {
        _ = run => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, exiting");
        }
    }

    std::process::ExitCode::SUCCESS
}
