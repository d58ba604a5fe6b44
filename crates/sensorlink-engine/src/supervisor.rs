//! Connection supervisor: owns the connect → pump → reconnect loop and the
//! per-connection engine run (decoder + dispatcher + reaper), all cancelled
//! together when the transport is lost.

use bytes::Bytes;
use sensorlink_core::constants::FRAME_TIMEOUT_IDLE_SECS;
use sensorlink_core::{ImageSink, TelemetrySink, Transport};
use sensorlink_protocol::FrameDecoder;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::reaper::{reap_interval, reap_once};

/// Bounded exponential backoff for reconnect attempts.
pub struct Backoff {
    attempt: u32,
    max_secs: u64,
}

impl Backoff {
    pub fn new(max_secs: u64) -> Self {
        Self { attempt: 0, max_secs }
    }

    pub fn next_delay(&mut self) -> Duration {
        let secs = (1u64 << self.attempt.min(10)).min(self.max_secs);
        self.attempt += 1;
        Duration::from_secs(secs)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Read-side loop: pump transport bytes through the decoder into the
/// dispatcher, running the reaper on its own tick, until the transport
/// signals loss (read error or a clean `Ok(0)`).
///
/// Runs until transport loss; cancellation (e.g. a shutdown signal the
/// caller selects alongside this future) is left to the caller via
/// `tokio::select!` — dropping this future mid-poll drops the decoder
/// buffer and aborts all in-flight per-source work, since nothing holds a
/// reference to it once the future is gone.
pub async fn run_engine_once<X, T, I>(
    transport: &mut X,
    writer_rx: &mut mpsc::Receiver<Bytes>,
    dispatcher: &mut Dispatcher<T, I>,
) -> sensorlink_core::Result<()>
where
    X: Transport,
    T: TelemetrySink + Clone + 'static,
    I: ImageSink,
{
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];
    let mut reap_tick = tokio::time::interval(reap_interval());
    reap_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            read_result = transport.read(&mut read_buf) => {
                let n = read_result?;
                if n == 0 {
                    info!("transport read returned EOF, treating as transport loss");
                    return Err(sensorlink_core::Error::TransportDisconnected("read returned 0 bytes".into()));
                }
                decoder.feed(&read_buf[..n]);
                let has_active_stream = dispatcher.has_active_image_stream();
                let eof_target = dispatcher.single_active_stream_target();
                for frame in decoder.drain(has_active_stream, eof_target) {
                    dispatcher.dispatch(frame).await;
                }
            }
            outbound = writer_rx.recv() => {
                match outbound {
                    Some(bytes) => transport.write(&bytes).await?,
                    None => { /* writer channel closed; dispatcher was dropped */ }
                }
            }
            _ = reap_tick.tick() => {
                reap_once(dispatcher).await;
                decoder.check_timeout(dispatcher.has_active_image_stream());
            }
        }
    }
}

/// Convenience: default frame-open timeout floor used by callers that want to
/// poll the decoder on a fixed cadence rather than per-read.
pub fn idle_frame_timeout() -> Duration {
    Duration::from_secs(FRAME_TIMEOUT_IDLE_SECS)
}

/// Drive connect → pump → reconnect against a transport factory, backing off
/// on repeated failures and resetting backoff after a successful connection
/// that ran for a nontrivial duration.
///
/// `connect` is retried indefinitely; `make_dispatcher` builds a fresh
/// dispatcher (and thus a fresh source table) for each connection attempt —
/// decoder and per-source state do not survive a reconnect.
pub async fn supervise<ConnectFn, ConnectFut, X, DispatcherFn, T, I>(
    mut connect: ConnectFn,
    mut make_dispatcher: DispatcherFn,
    max_backoff_secs: u64,
) where
    ConnectFn: FnMut() -> ConnectFut,
    ConnectFut: Future<Output = sensorlink_core::Result<X>>,
    X: Transport,
    DispatcherFn: FnMut() -> (Dispatcher<T, I>, mpsc::Receiver<Bytes>),
    T: TelemetrySink + Clone + 'static,
    I: ImageSink,
{
    let mut backoff = Backoff::new(max_backoff_secs);
    loop {
        match connect().await {
            Ok(mut transport) => {
                backoff.reset();
                let (mut dispatcher, mut writer_rx) = make_dispatcher();
                let started = tokio::time::Instant::now();
                let result = run_engine_once(&mut transport, &mut writer_rx, &mut dispatcher).await;
                dispatcher.cancel_pending_sleeps();
                warn!(ran_for = ?started.elapsed(), ?result, "engine run ended, will reconnect");
            }
            Err(err) => {
                let delay = backoff.next_delay();
                warn!(%err, ?delay, "connect failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
