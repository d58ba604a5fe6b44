//! `serialport`-backed duplex transport.
//!
//! The blocking `serialport::SerialPort` handle cannot be polled from async
//! code, so two dedicated OS threads own it — one blocked in `read`, one
//! blocked in `recv` waiting to `write` — and bridge to the async world over
//! a pair of bounded channels. A transport-loss signal (read error, write
//! error, unplugged device) closes the reader's outbound channel, which
//! `Transport::read` surfaces as `Ok(0)` to the connection supervisor.

use sensorlink_core::{Error, Result, Transport};
use std::io::{Read, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const CHANNEL_DEPTH: usize = 64;
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// A duplex connection to the serial gateway, implementing
/// [`Transport`](sensorlink_core::Transport).
pub struct SerialTransport {
    port_name: String,
    read_rx: mpsc::Receiver<Vec<u8>>,
    write_tx: mpsc::Sender<Vec<u8>>,
    reader: Option<std::thread::JoinHandle<()>>,
    writer: Option<std::thread::JoinHandle<()>>,
}

impl SerialTransport {
    /// Open `port` at `baud`, spawning the reader/writer worker threads.
    ///
    /// # Errors
    /// Returns `Error::TransportDisconnected` if the port cannot be opened or
    /// cloned for the writer thread.
    pub fn open(port: &str, baud: u32) -> Result<Self> {
        let reader_port = serialport::new(port, baud)
            .timeout(PORT_READ_TIMEOUT)
            .open()
            .map_err(|err| Error::TransportDisconnected(format!("failed to open {port}: {err}")))?;
        let writer_port = reader_port
            .try_clone()
            .map_err(|err| Error::TransportDisconnected(format!("failed to clone {port} for writer: {err}")))?;

        let (read_tx, read_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (write_tx, write_rx) = mpsc::channel(CHANNEL_DEPTH);

        let reader_name = port.to_string();
        let reader = std::thread::Builder::new()
            .name(format!("serial-read-{port}"))
            .spawn(move || reader_loop(reader_port, read_tx, reader_name))
            .map_err(|err| Error::TransportDisconnected(format!("failed to spawn reader thread: {err}")))?;

        let writer_name = port.to_string();
        let writer = std::thread::Builder::new()
            .name(format!("serial-write-{port}"))
            .spawn(move || writer_loop(writer_port, write_rx, writer_name))
            .map_err(|err| Error::TransportDisconnected(format!("failed to spawn writer thread: {err}")))?;

        Ok(Self { port_name: port.to_string(), read_rx, write_tx, reader: Some(reader), writer: Some(writer) })
    }
}

impl Transport for SerialTransport {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.read_rx.recv().await {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            None => Ok(0), // reader thread exited: transport loss
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_tx
            .send(bytes.to_vec())
            .await
            .map_err(|_| Error::TransportWrite(format!("{} writer thread has exited", self.port_name)))
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

fn reader_loop(mut port: Box<dyn serialport::SerialPort>, tx: mpsc::Sender<Vec<u8>>, port_name: String) {
    let mut buf = [0u8; 4096];
    loop {
        match port.read(&mut buf) {
            Ok(0) => {
                debug!(port = %port_name, "serial read returned 0 bytes, treating as transport loss");
                return;
            }
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    return; // transport dropped, stop reading
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(err) => {
                warn!(port = %port_name, %err, "serial read error, treating as transport loss");
                return;
            }
        }
    }
}

fn writer_loop(mut port: Box<dyn serialport::SerialPort>, mut rx: mpsc::Receiver<Vec<u8>>, port_name: String) {
    while let Some(bytes) = rx.blocking_recv() {
        if let Err(err) = port.write_all(&bytes) {
            warn!(port = %port_name, %err, "serial write error, stopping writer thread");
            return;
        }
    }
}
