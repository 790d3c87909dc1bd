//! Captured frames and horizontal stitching.

use crate::types::{PixelFormat, Side};
use thiserror::Error;

/// Errors constructing or combining frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer size {got} does not match {width}x{height} {format:?} (expected {expected})")]
    BufferSize {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        got: usize,
    },

    #[error("stitch geometry mismatch: left {left_w}x{left_h}, right {right_w}x{right_h}")]
    StitchGeometry {
        left_w: u32,
        left_h: u32,
        right_w: u32,
        right_h: u32,
    },

    #[error("stitch format mismatch: left {0:?}, right {1:?}")]
    StitchFormat(PixelFormat, PixelFormat),
}

/// A single captured frame.
///
/// Owned transiently: created by a capture, consumed by the encoder, then
/// dropped. The side tag always matches the sensor side that was selected at
/// the instant of capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub side: Side,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame, enforcing `data.len() == width * height * bpp`.
    pub fn new(
        side: Side,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                format,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            side,
            width,
            height,
            format,
            data,
        })
    }

    /// Image dimensions (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Byte length of one pixel row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

/// Horizontally concatenate a left/right pair into one `[L|R]` frame.
///
/// Both frames must share height and pixel format. The result keeps the left
/// frame's side tag; stitched payloads are addressed by lane, not side.
pub fn stitch(left: &Frame, right: &Frame) -> Result<Frame, FrameError> {
    if left.format != right.format {
        return Err(FrameError::StitchFormat(left.format, right.format));
    }
    if left.height != right.height {
        return Err(FrameError::StitchGeometry {
            left_w: left.width,
            left_h: left.height,
            right_w: right.width,
            right_h: right.height,
        });
    }

    let left_row = left.row_bytes();
    let right_row = right.row_bytes();
    let mut data = Vec::with_capacity(left.data.len() + right.data.len());
    for y in 0..left.height as usize {
        data.extend_from_slice(&left.data[y * left_row..(y + 1) * left_row]);
        data.extend_from_slice(&right.data[y * right_row..(y + 1) * right_row]);
    }

    Frame::new(
        left.side,
        left.width + right.width,
        left.height,
        left.format,
        data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(side: Side, width: u32, height: u32, fill: u8) -> Frame {
        Frame::new(
            side,
            width,
            height,
            PixelFormat::Grayscale,
            vec![fill; (width * height) as usize],
        )
        .unwrap()
    }

    #[test]
    fn test_frame_rejects_bad_buffer() {
        let err = Frame::new(Side::Left, 4, 4, PixelFormat::Rgb565, vec![0; 31]);
        assert!(matches!(err, Err(FrameError::BufferSize { expected: 32, got: 31, .. })));
    }

    #[test]
    fn test_stitch_interleaves_rows() {
        let left = gray(Side::Left, 2, 2, 0x11);
        let right = gray(Side::Right, 3, 2, 0x22);
        let out = stitch(&left, &right).unwrap();
        assert_eq!(out.dimensions(), (5, 2));
        assert_eq!(
            out.data,
            vec![0x11, 0x11, 0x22, 0x22, 0x22, 0x11, 0x11, 0x22, 0x22, 0x22]
        );
    }

    #[test]
    fn test_stitch_rejects_height_mismatch() {
        let left = gray(Side::Left, 2, 2, 0);
        let right = gray(Side::Right, 2, 3, 0);
        assert!(matches!(
            stitch(&left, &right),
            Err(FrameError::StitchGeometry { .. })
        ));
    }
}
