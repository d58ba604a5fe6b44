//! Wire-level and policy constants for the sensor frame protocol.
//!
//! # Wire Structure
//!
//! ```text
//! [ START (4) | SID (6) | TYPE (1) | SEQ (4) | LEN (4) | PAYLOAD (LEN) | CKSUM (4) | END (4) ]
//! ```
//!
//! All multi-byte integers are little-endian. `START_MARKER` and `END_MARKER`
//! are literal byte sequences, not single-byte delimiters.

// ============================================================================
// Frame markers
// ============================================================================

/// Literal bytes opening every frame on the wire.
pub const START_MARKER: [u8; 4] = [0xfa, 0xce, 0xaa, 0xbb];

/// Literal bytes closing every frame on the wire.
pub const END_MARKER: [u8; 4] = [0xcd, 0xef, 0x56, 0x78];

/// Length of the source-id field, in bytes.
pub const SID_LENGTH: usize = 6;

/// Length of the frame-type field, in bytes.
pub const TYPE_LENGTH: usize = 1;

/// Length of the sequence-number field, in bytes.
pub const SEQ_LENGTH: usize = 4;

/// Length of the payload-length field, in bytes.
pub const LEN_LENGTH: usize = 4;

/// Length of the checksum field, in bytes. Present on the wire, not verified by the core.
pub const CKSUM_LENGTH: usize = 4;

/// Bytes from the first START byte through the end of the length field, inclusive.
///
/// `START_MARKER + SID + TYPE + SEQ + LEN`.
pub const HEADER_LENGTH: usize =
    START_MARKER.len() + SID_LENGTH + TYPE_LENGTH + SEQ_LENGTH + LEN_LENGTH;

/// Bytes from the checksum field through the end marker, inclusive.
pub const FOOTER_LENGTH: usize = CKSUM_LENGTH + END_MARKER.len();

/// Smallest possible complete frame on the wire (`LEN == 0`).
pub const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + FOOTER_LENGTH;

// ============================================================================
// Protective caps
// ============================================================================

/// Maximum accepted payload length. Frames declaring a longer `LEN` are a sync error.
pub const MAX_PAYLOAD: usize = 512;

/// Maximum accepted sequence number. Frames declaring a larger `SEQ` are a sync error
/// (real sequences reset between image transfers and never approach this).
pub const MAX_REASONABLE_SEQ: u32 = 1_000_000;

/// Buffer growth sanity cap while resynchronizing with no progress.
pub const RESYNC_SANITY_CAP: usize = 1024;

// ============================================================================
// Timing
// ============================================================================

/// Frame-open timeout when no source has an active image stream.
pub const FRAME_TIMEOUT_IDLE_SECS: u64 = 2;

/// Frame-open timeout when at least one source has an active image stream
/// (chunks may legitimately pace out over the radio link).
pub const FRAME_TIMEOUT_STREAMING_SECS: u64 = 30;

/// Per-source idle window before the reaper tears down its state.
pub const IDLE_TIMEOUT_SECS: u64 = 20;

/// Delay after EOF processing completes before the sleep command is written,
/// aligned with the node's reception window opening.
pub const POST_EOF_DELAY_SECS: u64 = 2;

/// Minimum time between sleep commands sent to the same source.
pub const SLEEP_DEDUP_WINDOW_SECS: u64 = 10;

/// Minimum time between EOF frames processed for the same source (duplicate EOF guard).
pub const EOF_DEDUP_WINDOW_SECS: u64 = 5;

/// Per-write budget for the telemetry sink before the core logs and moves on.
pub const SINK_WRITE_TIMEOUT_SECS: u64 = 3;

// ============================================================================
// Resource caps
// ============================================================================

/// Maximum combined size, in bytes, of all open scratch blobs.
pub const MAX_TOTAL_BUFFER: u64 = 10 * 1024 * 1024;

/// Maximum number of concurrently open image streams.
pub const MAX_CONCURRENT_STREAMS: usize = 5;

/// Minimum accepted finalized image size, in bytes.
pub const MIN_IMAGE_SIZE: u64 = 1024;

// ============================================================================
// Telemetry decoding
// ============================================================================

/// Length, in hex characters, of a "dummy" (all-zero) hash that signals "no image follows".
pub const DUMMY_HASH_LENGTH: usize = 64;

/// Sentinel temperature value meaning "no reading".
pub const TEMP_SENTINEL_INVALID: &str = "-999";

// ============================================================================
// Sleep-duration policy
// ============================================================================

/// Sleep duration used when voltage is unknown.
pub const DEFAULT_SLEEP_SECS: u64 = 60;

/// Sleep duration used for low voltage observed in the afternoon/night.
pub const LONG_SLEEP_SECS: u64 = 9 * 60 * 60;

/// Sleep duration used for low voltage observed in the morning.
pub const MEDIUM_SLEEP_SECS: u64 = 60 * 60;

/// Sleep duration used for normal voltage.
pub const NORMAL_SLEEP_SECS: u64 = 10 * 60;

/// Battery percentage below which the low-voltage policy applies.
pub const LOW_VOLTAGE_THRESHOLD_PERCENT: f64 = 8.0;

/// Local hour (24h) at or after which "afternoon/night" sleep duration applies.
pub const AFTERNOON_HOUR_BOUNDARY: u32 = 12;

// ============================================================================
// Image validation
// ============================================================================

/// JPEG SOI marker expected at the start of a finalized image blob.
pub const IMAGE_MAGIC_HEAD: [u8; 2] = [0xff, 0xd8];

/// JPEG EOI marker expected at the end of a finalized image blob (warned, not fatal, if absent).
pub const IMAGE_MAGIC_TAIL: [u8; 2] = [0xff, 0xd9];
