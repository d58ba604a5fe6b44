//! Routes completed frames by type: HASH→telemetry write + image-stream
//! classification, DATA→append to the image assembler, EOF→finalize +
//! sleep-command emission.

use bytes::Bytes;
use chrono::Timelike;
use sensorlink_core::constants::{EOF_DEDUP_WINDOW_SECS, SINK_WRITE_TIMEOUT_SECS, SLEEP_DEDUP_WINDOW_SECS};
use sensorlink_core::{AssemblyMode, FrameType, ImageSink, Sid, TelemetrySink};
use sensorlink_protocol::{Frame, decode_hash_payload, encode_sleep_command, sleep_duration_for};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::image_assembler::ImageAssembler;
use crate::source_table::SourceTable;

/// Dispatches decoded frames against the source table, image assembler, and
/// telemetry sink, and schedules sleep-command writes onto a transport writer
/// channel.
///
/// `pending_sleeps` tracks in-flight post-EOF-delay tasks so the connection
/// supervisor can abort them all on transport loss.
pub struct Dispatcher<T: TelemetrySink, I: ImageSink> {
    pub table: SourceTable,
    assembler: ImageAssembler<I>,
    telemetry: T,
    writer_tx: mpsc::Sender<Bytes>,
    pending_sleeps: JoinSet<()>,
}

impl<T: TelemetrySink + Clone + 'static, I: ImageSink> Dispatcher<T, I> {
    pub fn new(telemetry: T, image_sink: I, writer_tx: mpsc::Sender<Bytes>) -> Self {
        Self::with_mode(telemetry, image_sink, writer_tx, AssemblyMode::default())
    }

    pub fn with_mode(telemetry: T, image_sink: I, writer_tx: mpsc::Sender<Bytes>, mode: AssemblyMode) -> Self {
        Self { table: SourceTable::new(), assembler: ImageAssembler::with_mode(image_sink, mode), telemetry, writer_tx, pending_sleeps: JoinSet::new() }
    }

    pub fn has_active_image_stream(&self) -> bool {
        self.table.any_active_stream()
    }

    pub fn single_active_stream_target(&self) -> Option<Sid> {
        self.table.single_active_stream_target()
    }

    /// Abort every pending sleep-command write (used on transport loss).
    pub fn cancel_pending_sleeps(&mut self) {
        self.pending_sleeps.abort_all();
    }

    /// Abort an in-progress image stream without finalizing it (reaper / LRU eviction).
    pub async fn abort_image(&mut self, sid: Sid, reason: &str) {
        self.assembler.abort(sid, reason).await;
    }

    pub fn assembler_total_bytes(&self) -> u64 {
        self.assembler.total_bytes()
    }

    pub async fn dispatch(&mut self, frame: Frame) {
        match frame.frame_type {
            FrameType::Hash => self.handle_hash(frame).await,
            FrameType::Data => self.handle_data(frame).await,
            FrameType::Eof => self.handle_eof(frame).await,
        }
    }

    async fn handle_hash(&mut self, frame: Frame) {
        let sid = frame.source_id;
        let reading = match decode_hash_payload(&frame.payload) {
            Ok(r) => r,
            Err(err) => {
                warn!(%sid, %err, "dropping HASH frame with undecodable payload");
                return;
            }
        };

        let has_image_expected = !reading.is_dummy_hash;
        {
            let source = self.table.get_or_create(sid);
            source.voltage_cache = reading.voltage;
            source.has_image_expected = has_image_expected;
            source.touch();
        }

        self.write_telemetry(sid, reading.voltage, reading.temperature).await;

        if has_image_expected && !self.assembler.has_stream(sid) {
            if let Err(err) = self.assembler.start(sid).await {
                error!(%sid, %err, "failed to start image stream from HASH");
                return;
            }
        }
        if let Some(source) = self.table.get_mut(sid) {
            source.image_stream = self.assembler.has_stream(sid).then_some(sensorlink_core::ImageHandle(sid));
        }
    }

    async fn handle_data(&mut self, frame: Frame) {
        let sid = frame.source_id;
        let seq = frame.sequence;

        let expected = self.table.get(sid).and_then(|s| s.last_sequence).map(|last| last.wrapping_add(1));
        if let Some(expected) = expected {
            if expected != seq {
                warn!(%sid, expected, got = seq, "sequence gap in DATA frames");
            }
        }

        if let Err(err) = self.assembler.append(sid, &frame.payload).await {
            error!(%sid, %err, "failed to append image chunk, aborting stream");
            self.assembler.abort(sid, "append failed").await;
        }

        let source = self.table.get_or_create(sid);
        source.last_sequence = Some(seq);
        source.last_data_time = Instant::now();
        source.image_stream = Some(sensorlink_core::ImageHandle(sid));
        source.stats.chunks_received += 1;
        source.stats.bytes_received += frame.payload.len() as u64;
        source.stats.first_chunk_time.get_or_insert_with(Instant::now);
        source.touch();
    }

    async fn handle_eof(&mut self, frame: Frame) {
        let sid = frame.source_id;

        if let Some(source) = self.table.get(sid) {
            if let Some(last) = source.eof_processed_time {
                if last.elapsed() < Duration::from_secs(EOF_DEDUP_WINDOW_SECS) {
                    debug!(%sid, "duplicate EOF within dedup window, skipping");
                    return;
                }
            }
        }

        let had_stream = self.assembler.has_stream(sid);
        if had_stream {
            match self.assembler.finalize(sid).await {
                Ok(location) => info!(%sid, location, "image finalized"),
                Err(err) => warn!(%sid, %err, "image rejected, proceeding to sleep command anyway"),
            }
        }

        let voltage = self.table.get(sid).and_then(|s| s.voltage_cache);
        {
            let source = self.table.get_or_create(sid);
            source.eof_processed_time = Some(Instant::now());
            source.image_stream = None;
            source.touch();
        }

        self.emit_sleep_command(sid, voltage);
    }

    async fn write_telemetry(&self, sid: Sid, voltage: Option<f64>, temperature: Option<f64>) {
        let timestamp_nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let write = self.telemetry.write(sid, voltage, temperature, timestamp_nanos);
        match tokio::time::timeout(Duration::from_secs(SINK_WRITE_TIMEOUT_SECS), write).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%sid, %err, "telemetry sink write failed"),
            Err(_) => error!(%sid, "telemetry sink write timed out"),
        }
    }

    fn emit_sleep_command(&mut self, sid: Sid, voltage: Option<f64>) {
        if let Some(source) = self.table.get(sid) {
            if let Some(last) = source.sleep_sent_time {
                if last.elapsed() < Duration::from_secs(SLEEP_DEDUP_WINDOW_SECS) {
                    debug!(%sid, "sleep command dedup window active, skipping");
                    return;
                }
            }
        }

        let hour = chrono::Local::now().hour();
        let duration_secs = sleep_duration_for(voltage, hour);
        let command = encode_sleep_command(sid, duration_secs);
        info!(%sid, duration_secs, "scheduling sleep command");

        if let Some(source) = self.table.get_mut(sid) {
            source.sleep_sent_time = Some(Instant::now());
        }

        let tx = self.writer_tx.clone();
        self.pending_sleeps.spawn(async move {
            tokio::time::sleep(Duration::from_secs(sensorlink_core::constants::POST_EOF_DELAY_SECS)).await;
            if tx.send(Bytes::from(command.into_bytes())).await.is_err() {
                warn!("transport writer channel closed, sleep command dropped");
            }
        });
    }
}
