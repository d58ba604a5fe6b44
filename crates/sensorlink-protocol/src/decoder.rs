//! Frame decoder: a stateful byte-buffer demultiplexer for the serial wire format.
//!
//! # Wire Framing
//!
//! ```text
//! [ START (4) | SID (6) | TYPE (1) | SEQ (4) | LEN (4) | PAYLOAD (LEN) | CKSUM (4) | END (4) ]
//! ```
//!
//! `feed()` appends arbitrary chunks to an internal buffer; `drain()` extracts
//! zero or more complete frames, discarding junk and resynchronizing on
//! corruption so one bad frame never stalls the stream.
//!
//! # Why This Design?
//!
//! The gateway delivers bytes from many interleaved remote nodes over one
//! serial link with no guaranteed delivery. A single `read()` may contain a
//! partial frame, several complete frames, or noise. The state machine here
//! mirrors that reality:
//!
//! - **Partial frames**: buffered until complete.
//! - **Noise / corruption**: discarded with a warning, never fatal.
//! - **Stalled frames**: an adaptive frame-open timeout discards an
//!   in-progress frame that never completes.

use bytes::{Bytes, BytesMut};
use sensorlink_core::constants::{
    END_MARKER, FRAME_TIMEOUT_IDLE_SECS, FRAME_TIMEOUT_STREAMING_SECS, HEADER_LENGTH,
    MAX_PAYLOAD, MAX_REASONABLE_SEQ, MIN_FRAME_LENGTH, RESYNC_SANITY_CAP, SID_LENGTH,
    START_MARKER,
};
use sensorlink_core::{FrameType, Sid};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use crate::frame::Frame;

const OOB_EOF_SHORT: &[u8] = b"EOF";
const OOB_EOF_LONG: &[u8] = b"---EOF---";

/// Stateful decoder that turns a growing byte buffer into a sequence of [`Frame`]s.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    frame_open_time: Option<Instant>,
    frames: VecDeque<Frame>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buffer: BytesMut::with_capacity(4096), frame_open_time: None, frames: VecDeque::new() }
    }

    /// Append newly-read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract every frame currently decodable from the buffer.
    ///
    /// `active_eof_target` should be `Some(sid)` when exactly one source has
    /// an active image stream (enabling the out-of-band ASCII `EOF` /
    /// `---EOF---` compatibility path for that source), and `None` otherwise.
    pub fn drain(&mut self, has_active_image_stream: bool, active_eof_target: Option<Sid>) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(frame) = self.try_extract_one(has_active_image_stream, active_eof_target) {
            out.push(frame);
        }
        out
    }

    /// Check the frame-open timeout without requiring new bytes.
    ///
    /// The engine calls this on its idle tick so a stalled in-progress frame
    /// doesn't wait forever for bytes that never arrive.
    pub fn check_timeout(&mut self, has_active_image_stream: bool) {
        self.maybe_apply_timeout(has_active_image_stream);
    }

    fn try_extract_one(
        &mut self,
        has_active_image_stream: bool,
        active_eof_target: Option<Sid>,
    ) -> Option<Frame> {
        loop {
            self.maybe_apply_timeout(has_active_image_stream);

            let Some(start_pos) = find_subslice(&self.buffer, &START_MARKER) else {
                if let Some(sid) = active_eof_target {
                    if let Some(frame) = self.try_out_of_band_eof(sid) {
                        return Some(frame);
                    }
                }
                self.retain_partial_marker_tail();
                return None;
            };

            if start_pos > 0 {
                warn!(
                    discarded_bytes = start_pos,
                    preview = %hex_preview(&self.buffer[..start_pos]),
                    "discarding junk before start marker"
                );
                let _ = self.buffer.split_to(start_pos);
            }

            if self.frame_open_time.is_none() {
                self.frame_open_time = Some(Instant::now());
            }

            if self.buffer.len() < HEADER_LENGTH {
                return None;
            }

            let header = parse_header(&self.buffer);
            if header.declared_len > MAX_PAYLOAD || header.sequence > MAX_REASONABLE_SEQ {
                warn!(
                    len = header.declared_len,
                    seq = header.sequence,
                    "rejecting frame with implausible header, resyncing"
                );
                self.advance_and_rescan();
                continue;
            }

            let total_len = MIN_FRAME_LENGTH + header.declared_len;
            if self.buffer.len() < total_len {
                return None;
            }

            let end_offset = total_len - END_MARKER.len();
            if &self.buffer[end_offset..total_len] != END_MARKER {
                warn!("end marker mismatch, discarding frame and resyncing");
                self.advance_and_rescan();
                continue;
            }

            let frame_bytes = self.buffer.split_to(total_len).freeze();
            self.frame_open_time = None;

            let Some(frame) = build_frame(&header, frame_bytes) else {
                // Unknown/reserved type: bytes are already consumed above, no
                // source state is touched, nothing is dispatched. Re-scan for
                // the next frame instead of yielding a synthesized one.
                continue;
            };
            trace!(
                sid = %Sid::new(header.sid),
                type_byte = header.type_byte,
                seq = header.sequence,
                len = header.declared_len,
                "extracted frame"
            );
            return Some(frame);
        }
    }

    fn maybe_apply_timeout(&mut self, has_active_image_stream: bool) {
        let Some(opened) = self.frame_open_time else { return };
        let timeout = if has_active_image_stream {
            Duration::from_secs(FRAME_TIMEOUT_STREAMING_SECS)
        } else {
            Duration::from_secs(FRAME_TIMEOUT_IDLE_SECS)
        };
        if opened.elapsed() <= timeout {
            return;
        }
        warn!(?timeout, "frame-open timeout, discarding in-progress frame");
        self.frame_open_time = None;
        match find_subslice(&self.buffer[1.min(self.buffer.len())..], &START_MARKER) {
            Some(rel) => {
                let abs = rel + 1.min(self.buffer.len());
                let _ = self.buffer.split_to(abs);
            }
            None => {
                if !has_active_image_stream {
                    self.buffer.clear();
                }
            }
        }
    }

    fn advance_and_rescan(&mut self) {
        self.frame_open_time = None;
        let skip = START_MARKER.len().min(self.buffer.len());
        let _ = self.buffer.split_to(skip);
        if self.buffer.len() > RESYNC_SANITY_CAP && find_subslice(&self.buffer, &START_MARKER).is_none() {
            self.buffer.clear();
        }
    }

    fn retain_partial_marker_tail(&mut self) {
        let keep = (START_MARKER.len() - 1).min(self.buffer.len());
        if self.buffer.len() > keep {
            let drop = self.buffer.len() - keep;
            let _ = self.buffer.split_to(drop);
        }
    }

    fn try_out_of_band_eof(&mut self, sid: Sid) -> Option<Frame> {
        let pos = find_subslice(&self.buffer, OOB_EOF_LONG)
            .map(|p| (p, OOB_EOF_LONG.len()))
            .or_else(|| find_subslice(&self.buffer, OOB_EOF_SHORT).map(|p| (p, OOB_EOF_SHORT.len())))?;
        let (pos, marker_len) = pos;
        if pos > 0 {
            warn!(discarded_bytes = pos, "discarding junk before out-of-band EOF marker");
        }
        let _ = self.buffer.split_to(pos + marker_len);
        self.frame_open_time = None;
        Some(Frame::new(sid, FrameType::Eof, 0, Bytes::new()))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

struct Header {
    sid: [u8; SID_LENGTH],
    type_byte: u8,
    sequence: u32,
    declared_len: usize,
}

fn parse_header(buf: &[u8]) -> Header {
    let mut sid = [0u8; SID_LENGTH];
    sid.copy_from_slice(&buf[4..4 + SID_LENGTH]);
    let type_byte = buf[4 + SID_LENGTH];
    let seq_off = 4 + SID_LENGTH + 1;
    let sequence = u32::from_le_bytes(buf[seq_off..seq_off + 4].try_into().unwrap());
    let len_off = seq_off + 4;
    let declared_len = u32::from_le_bytes(buf[len_off..len_off + 4].try_into().unwrap()) as usize;
    Header { sid, type_byte, sequence, declared_len }
}

/// Build a dispatchable frame from a fully-consumed header, or `None` for an
/// unknown/reserved type byte. The caller has already advanced the buffer
/// past the frame's bytes either way; `None` means consume-without-dispatch,
/// not a retryable failure.
fn build_frame(header: &Header, frame_bytes: Bytes) -> Option<Frame> {
    let sid = Sid::new(header.sid);
    let frame_type = match FrameType::from_u8(header.type_byte) {
        Some(t) => t,
        None => {
            warn!(type_byte = header.type_byte, sid = %sid, "unknown frame type, consuming without dispatch");
            return None;
        }
    };
    let payload_start = HEADER_LENGTH;
    let payload_end = payload_start + header.declared_len;
    let payload = frame_bytes.slice(payload_start..payload_end);
    Some(Frame::new(sid, frame_type, header.sequence, payload))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn hex_preview(bytes: &[u8]) -> String {
    bytes.iter().take(8).map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}
