//! Per-source image reassembly: owns a scratch blob (via the injected
//! [`ImageSink`]) per source until finalization, validates the soft
//! first-chunk magic-head check, and enforces the concurrency and total
//! memory caps.

use bytes::Bytes;
use sensorlink_core::constants::{IMAGE_MAGIC_HEAD, MAX_CONCURRENT_STREAMS, MAX_TOTAL_BUFFER};
use sensorlink_core::{AssemblyMode, ImageHandle, ImageSink, Sid};
use std::collections::HashMap;
use std::time::Instant;
use tracing::warn;

struct OpenStream {
    handle: ImageHandle,
    started_at: Instant,
    bytes_written: u64,
    first_chunk_seen: bool,
    /// Only populated in `AssemblyMode::Legacy`: chunks are held here and
    /// flushed to the sink in one batch on finalize, rather than appended as
    /// each DATA frame arrives.
    pending: Vec<u8>,
}

/// Owns all currently-open image transfers across sources.
///
/// Generic over the sink so tests can inject an in-memory fake; production
/// wiring injects the filesystem-backed adapter from `sensorlink-sinks`. The
/// sink's `open`/`append`/`close` contract is identical in both assembly
/// modes — `mode` only changes when `append` calls reach the sink (see
/// [`ImageAssembler::append`] and [`ImageAssembler::finalize`]).
pub struct ImageAssembler<S: ImageSink> {
    sink: S,
    mode: AssemblyMode,
    streams: HashMap<Sid, OpenStream>,
}

impl<S: ImageSink> ImageAssembler<S> {
    pub fn new(sink: S) -> Self {
        Self::with_mode(sink, AssemblyMode::default())
    }

    pub fn with_mode(sink: S, mode: AssemblyMode) -> Self {
        Self { sink, mode, streams: HashMap::new() }
    }

    pub fn has_stream(&self, sid: Sid) -> bool {
        self.streams.contains_key(&sid)
    }

    pub fn total_bytes(&self) -> u64 {
        self.streams.values().map(|s| s.bytes_written).sum()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// The SID of the oldest-started open stream, if any — evicted first on overflow.
    pub fn oldest_stream(&self) -> Option<Sid> {
        self.streams.iter().min_by_key(|(_, s)| s.started_at).map(|(sid, _)| *sid)
    }

    /// Start a new transfer for `sid`, or — if one is already open — leave it
    /// untouched (HASH may arrive after the first DATA chunks due to pipelining).
    pub async fn start(&mut self, sid: Sid) -> sensorlink_core::Result<()> {
        if self.streams.contains_key(&sid) {
            return Ok(());
        }
        if self.streams.len() >= MAX_CONCURRENT_STREAMS {
            if let Some(oldest) = self.oldest_stream() {
                warn!(sid = %oldest, "concurrent image stream cap exceeded, aborting oldest stream");
                self.abort(oldest, "concurrency cap exceeded").await;
            }
        }
        let handle = self.sink.open(sid).await?;
        self.streams.insert(
            sid,
            OpenStream { handle, started_at: Instant::now(), bytes_written: 0, first_chunk_seen: false, pending: Vec::new() },
        );
        Ok(())
    }

    /// Append one DATA chunk. Starts a stream implicitly if none exists yet.
    ///
    /// In `Streaming` mode the chunk reaches the sink immediately. In
    /// `Legacy` mode it is held in memory and flushed as one batch when the
    /// transfer finalizes, matching the distilled system's buffer-then-save
    /// strategy.
    pub async fn append(&mut self, sid: Sid, chunk: &Bytes) -> sensorlink_core::Result<()> {
        if !self.streams.contains_key(&sid) {
            self.start(sid).await?;
        }
        let stream = self.streams.get_mut(&sid).expect("just started above");

        if !stream.first_chunk_seen {
            stream.first_chunk_seen = true;
            if !chunk.starts_with(&IMAGE_MAGIC_HEAD) {
                warn!(sid = %sid, "first image chunk does not start with expected magic head");
            }
        }

        match self.mode {
            AssemblyMode::Streaming => self.sink.append(stream.handle, chunk).await?,
            AssemblyMode::Legacy => stream.pending.extend_from_slice(chunk),
        }
        stream.bytes_written += chunk.len() as u64;

        self.enforce_total_buffer_cap().await;
        Ok(())
    }

    /// Validate and persist the transfer, removing it from the open set either way.
    pub async fn finalize(&mut self, sid: Sid) -> sensorlink_core::Result<String> {
        let Some(stream) = self.streams.remove(&sid) else {
            return Err(sensorlink_core::Error::ScratchMissing(sid.to_hex_colon()));
        };
        if self.mode == AssemblyMode::Legacy && !stream.pending.is_empty() {
            self.sink.append(stream.handle, &stream.pending).await?;
        }
        self.sink.close(stream.handle).await
    }

    /// Delete the scratch state for `sid` without persisting it.
    pub async fn abort(&mut self, sid: Sid, reason: &str) {
        if let Some(stream) = self.streams.remove(&sid) {
            warn!(sid = %sid, reason, "aborting image stream");
            self.sink.discard(stream.handle).await;
        }
    }

    async fn enforce_total_buffer_cap(&mut self) {
        while self.total_bytes() > MAX_TOTAL_BUFFER {
            let Some(oldest) = self.oldest_stream() else { break };
            warn!(sid = %oldest, "total scratch buffer cap exceeded, evicting oldest stream");
            self.abort(oldest, "total buffer cap exceeded").await;
        }
    }
}
