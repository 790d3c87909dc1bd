//! Wire-protocol constants shared by the sender and the collector.
//!
//! One request per connection; the body is length-delimited by an exact
//! `Content-Length`. Raw uploads declare their geometry in headers because
//! the pixel stream itself carries no framing.

/// Upload path for compressed (JPEG) payloads.
pub const JPEG_UPLOAD_PATH: &str = "/upload/jpeg";

/// Upload path for raw fixed-size pixel payloads.
pub const RAW_UPLOAD_PATH: &str = "/upload/raw";

/// Liveness probe path; returns a fixed short OK body.
pub const HEALTH_PATH: &str = "/healthz";

/// Lane tag: `L`, `R`, or `S` for a stitched upload. Optional on the JPEG
/// path (absent means stitched), required on the raw path.
pub const HDR_SIDE: &str = "X-Side";

/// Frame identifier, echoed back for correlation. Side sends carry the
/// numeric id suffixed with the lane letter.
pub const HDR_FRAME_ID: &str = "X-Frame-Id";

/// Declared pixel width of a raw payload.
pub const HDR_WIDTH: &str = "X-Width";

/// Declared pixel height of a raw payload.
pub const HDR_HEIGHT: &str = "X-Height";

/// Pixel format tag of a raw payload (`rgb565` or `grayscale`).
pub const HDR_PIXEL_FORMAT: &str = "X-Pixel-Format";
