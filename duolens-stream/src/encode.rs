//! Frame-to-payload encoding.
//!
//! A byte-faithful transcoder: no resizing, no cropping. Raw mode forwards
//! the sample buffer verbatim with an exact-length check; compressed mode
//! produces JPEG at the configured quality, with pixel expansion to RGB8 as
//! part of compression.

use bytes::Bytes;
use duolens_core::{Frame, PixelFormat, StreamMode};
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

/// Compressed outputs below this are treated as corrupt, not forwarded.
pub const MIN_JPEG_BYTES: usize = 128;

/// Payload build failures. The frame is dropped, never retried.
#[derive(Debug, Error)]
pub enum EncodeFault {
    #[error("raw length {got} does not match declared geometry (expected {expected})")]
    LengthMismatch { expected: usize, got: usize },

    #[error("compressed output {got} bytes, below plausible minimum {min}")]
    TooSmall { got: usize, min: usize },

    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Encode one frame for the wire.
pub fn encode(frame: &Frame, mode: StreamMode, quality: u8) -> Result<Bytes, EncodeFault> {
    match mode {
        StreamMode::Raw => {
            let expected =
                frame.width as usize * frame.height as usize * frame.format.bytes_per_pixel();
            if frame.data.len() != expected {
                return Err(EncodeFault::LengthMismatch {
                    expected,
                    got: frame.data.len(),
                });
            }
            Ok(Bytes::copy_from_slice(&frame.data))
        }
        StreamMode::Compressed => {
            let mut out = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
            match frame.format {
                PixelFormat::Rgb565 => {
                    let rgb = rgb565_le_to_rgb8(&frame.data);
                    encoder.encode(
                        &rgb,
                        frame.width,
                        frame.height,
                        image::ExtendedColorType::Rgb8,
                    )?;
                }
                PixelFormat::Grayscale => {
                    encoder.encode(
                        &frame.data,
                        frame.width,
                        frame.height,
                        image::ExtendedColorType::L8,
                    )?;
                }
            }
            if out.len() < MIN_JPEG_BYTES {
                return Err(EncodeFault::TooSmall {
                    got: out.len(),
                    min: MIN_JPEG_BYTES,
                });
            }
            Ok(Bytes::from(out))
        }
    }
}

/// Expand little-endian RGB565 words to 8-bit RGB triples.
fn rgb565_le_to_rgb8(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for pair in data.chunks_exact(2) {
        let word = u16::from_le_bytes([pair[0], pair[1]]);
        let r = ((word >> 11) & 0x1F) as u8;
        let g = ((word >> 5) & 0x3F) as u8;
        let b = (word & 0x1F) as u8;
        // Replicate high bits into the low bits for full 0-255 range.
        rgb.push((r << 3) | (r >> 2));
        rgb.push((g << 2) | (g >> 4));
        rgb.push((b << 3) | (b >> 2));
    }
    rgb
}
