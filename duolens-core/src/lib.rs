//! Core data types shared by the duolens capture device and collector.
//!
//! These are CPU-side representations with no I/O: sides and lanes, pixel
//! formats, frames with their buffer-size invariant, payloads, and the wire
//! constants both ends of the stream agree on.

pub mod frame;
pub mod payload;
pub mod types;
pub mod wire;

pub use frame::{Frame, FrameError, stitch};
pub use payload::Payload;
pub use types::{FrameId, Lane, PixelFormat, Side, StreamMode};
