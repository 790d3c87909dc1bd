//! Encoded payloads ready for the wire.

use crate::types::{FrameId, Lane, PixelFormat, StreamMode};
use bytes::Bytes;

/// One encoded frame (or stitched pair), ready to send.
#[derive(Debug, Clone)]
pub struct Payload {
    pub lane: Lane,
    pub frame_id: FrameId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub kind: StreamMode,
    pub bytes: Bytes,
}

impl Payload {
    /// Wire frame-id tag (`"12L"`, `"12R"`, or `"12"` for stitched).
    pub fn tag(&self) -> String {
        self.frame_id.tag(self.lane)
    }
}
