//! Periodic per-source timeout sweep, bounded by the global scratch-buffer cap.

use sensorlink_core::constants::{IDLE_TIMEOUT_SECS, MAX_TOTAL_BUFFER};
use sensorlink_core::ImageSink;
use std::time::Duration;
use tracing::info;

use crate::dispatcher::Dispatcher;
use sensorlink_core::TelemetrySink;

/// Abort every source whose `last_any_time` exceeds the idle window, then
/// evict LRU-by-`last_any_time` until the total scratch buffer is back under
/// `MAX_TOTAL_BUFFER`.
pub async fn reap_once<T, I>(dispatcher: &mut Dispatcher<T, I>)
where
    T: TelemetrySink + Clone + 'static,
    I: ImageSink,
{
    let idle_window = Duration::from_secs(IDLE_TIMEOUT_SECS);
    let stale = dispatcher.table.idle_sources(idle_window);

    for sid in stale {
        if dispatcher.table.get(sid).map(|s| s.image_stream.is_some()).unwrap_or(false) {
            dispatcher.abort_image(sid, "idle timeout").await;
        }
        dispatcher.table.remove(sid);
        info!(%sid, "reaped idle source");
    }

    while dispatcher.assembler_total_bytes() > MAX_TOTAL_BUFFER {
        let Some(sid) = dispatcher.table.least_recently_touched() else { break };
        dispatcher.abort_image(sid, "total buffer cap exceeded after reap").await;
        dispatcher.table.remove(sid);
        info!(%sid, "evicted source over global memory cap");
    }
}

/// Default interval between reaper sweeps.
pub fn reap_interval() -> Duration {
    Duration::from_secs(IDLE_TIMEOUT_SECS)
}
