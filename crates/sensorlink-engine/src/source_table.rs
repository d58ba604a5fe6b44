//! Per-source state, collapsed into one record keyed by [`Sid`] instead of
//! the ad-hoc parallel maps (buffers, timestamps, sequence, voltage cache,
//! eof/sleep flags) the distilled source material kept separately.

use sensorlink_core::{ImageHandle, Sid};
use std::collections::HashMap;
use std::time::Instant;

/// Running counters for one source's current (or most recent) image transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferStats {
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub first_chunk_time: Option<Instant>,
}

/// All mutable state the engine tracks for one remote node.
///
/// Created lazily on first successful frame parse; mutated only by the
/// single dispatcher task; destroyed on successful EOF, reaper timeout, LRU
/// eviction, or receiver shutdown.
#[derive(Debug)]
pub struct SourceState {
    pub sid: Sid,

    /// Handle to the open scratch blob, if an image transfer is in progress.
    pub image_stream: Option<ImageHandle>,
    /// When the current image stream was opened (for concurrency-cap eviction).
    pub stream_started_at: Option<Instant>,

    pub last_sequence: Option<u32>,
    pub last_data_time: Instant,
    pub last_any_time: Instant,

    /// Latest HASH-decoded voltage, consumed by the sleep dispatcher.
    pub voltage_cache: Option<f64>,
    /// Classification from the most recent HASH: does an image follow?
    pub has_image_expected: bool,

    pub eof_processed_time: Option<Instant>,
    pub sleep_sent_time: Option<Instant>,

    pub stats: TransferStats,
}

impl SourceState {
    fn new(sid: Sid) -> Self {
        let now = Instant::now();
        Self {
            sid,
            image_stream: None,
            stream_started_at: None,
            last_sequence: None,
            last_data_time: now,
            last_any_time: now,
            voltage_cache: None,
            has_image_expected: false,
            eof_processed_time: None,
            sleep_sent_time: None,
            stats: TransferStats::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_any_time = Instant::now();
    }
}

/// Mapping from source identifier to per-source state.
///
/// Single-owner: all mutation is serialized by the dispatcher task that owns
/// this table. Insertion order is not significant — lookups are by [`Sid`].
#[derive(Debug, Default)]
pub struct SourceTable {
    sources: HashMap<Sid, SourceState>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self { sources: HashMap::new() }
    }

    /// Look up existing state for `sid`, or insert fresh state on first frame.
    pub fn get_or_create(&mut self, sid: Sid) -> &mut SourceState {
        self.sources.entry(sid).or_insert_with(|| SourceState::new(sid))
    }

    pub fn get(&self, sid: Sid) -> Option<&SourceState> {
        self.sources.get(&sid)
    }

    pub fn get_mut(&mut self, sid: Sid) -> Option<&mut SourceState> {
        self.sources.get_mut(&sid)
    }

    pub fn remove(&mut self, sid: Sid) -> Option<SourceState> {
        self.sources.remove(&sid)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// `true` when exactly one source currently has an open image stream,
    /// returning its SID — used to gate the out-of-band ASCII EOF compatibility path.
    pub fn single_active_stream_target(&self) -> Option<Sid> {
        let mut found = None;
        for state in self.sources.values() {
            if state.image_stream.is_some() {
                if found.is_some() {
                    return None; // more than one; ambiguous
                }
                found = Some(state.sid);
            }
        }
        found
    }

    pub fn any_active_stream(&self) -> bool {
        self.sources.values().any(|s| s.image_stream.is_some())
    }

    /// Sources whose `last_any_time` is older than `max_idle`, oldest first.
    pub fn idle_sources(&self, max_idle: std::time::Duration) -> Vec<Sid> {
        let now = Instant::now();
        let mut stale: Vec<(Sid, Instant)> =
            self.sources.values().filter(|s| now.duration_since(s.last_any_time) > max_idle).map(|s| (s.sid, s.last_any_time)).collect();
        stale.sort_by_key(|(_, last_any)| *last_any);
        stale.into_iter().map(|(sid, _)| sid).collect()
    }

    /// The SID with the oldest `last_any_time`, for LRU eviction under the memory cap.
    pub fn least_recently_touched(&self) -> Option<Sid> {
        self.sources.values().min_by_key(|s| s.last_any_time).map(|s| s.sid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceState> {
        self.sources.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_inserts_once() {
        let mut table = SourceTable::new();
        let sid = Sid::new([1, 2, 3, 4, 5, 6]);
        table.get_or_create(sid).voltage_cache = Some(50.0);
        assert_eq!(table.get(sid).unwrap().voltage_cache, Some(50.0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn single_active_stream_target_requires_exactly_one() {
        let mut table = SourceTable::new();
        let a = Sid::new([1, 1, 1, 1, 1, 1]);
        let b = Sid::new([2, 2, 2, 2, 2, 2]);
        assert_eq!(table.single_active_stream_target(), None);

        table.get_or_create(a).image_stream = Some(ImageHandle(a));
        assert_eq!(table.single_active_stream_target(), Some(a));

        table.get_or_create(b).image_stream = Some(ImageHandle(b));
        assert_eq!(table.single_active_stream_target(), None);
    }

    #[test]
    fn least_recently_touched_picks_oldest() {
        let mut table = SourceTable::new();
        let a = Sid::new([1, 1, 1, 1, 1, 1]);
        let b = Sid::new([2, 2, 2, 2, 2, 2]);
        table.get_or_create(a).last_any_time = Instant::now() - std::time::Duration::from_secs(10);
        table.get_or_create(b).touch();
        assert_eq!(table.least_recently_touched(), Some(a));
    }
}
