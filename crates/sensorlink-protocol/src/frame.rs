//! The parsed, in-memory representation of one wire frame.

use bytes::Bytes;
use sensorlink_core::{FrameType, Sid};

/// A single decoded frame.
///
/// `payload` is an owned, reference-counted copy — the decoder copies it out
/// of the wire buffer so the frame outlives the bytes it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub source_id: Sid,
    pub frame_type: FrameType,
    pub sequence: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(source_id: Sid, frame_type: FrameType, sequence: u32, payload: Bytes) -> Self {
        Self { source_id, frame_type, sequence, payload }
    }

    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_carries_fields_verbatim() {
        let sid = Sid::new([1, 2, 3, 4, 5, 6]);
        let frame = Frame::new(sid, FrameType::Data, 7, Bytes::from_static(b"chunk"));
        assert_eq!(frame.source_id, sid);
        assert_eq!(frame.frame_type, FrameType::Data);
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.payload_len(), 5);
    }
}
