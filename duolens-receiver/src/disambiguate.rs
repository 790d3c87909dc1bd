//! Blind byte-order disambiguation for raw RGB565 payloads.
//!
//! Different device firmware revisions emit 16-bit samples in either byte
//! order, and the wire format does not say which. Both interpretations are
//! decoded and scored by smoothness (mean absolute neighbor difference along
//! both axes); natural images are comparatively smooth, while the wrong
//! order turns into high-frequency noise. The losing score is kept on the
//! report: the heuristic is best effort, and a misclassification on
//! pathological content has to stay diagnosable after the fact.

use image::RgbImage;

/// Byte order of 16-bit samples in a raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ByteOrder::Little => "little",
            ByteOrder::Big => "big",
        }
    }
}

/// Outcome of one disambiguation, with both candidate scores.
#[derive(Debug, Clone, Copy)]
pub struct DisambiguationReport {
    pub order: ByteOrder,
    pub little_score: f64,
    pub big_score: f64,
}

/// Decode RGB565 words under the given byte order into an RGB8 image.
///
/// The buffer length must be exactly `width * height * 2`; callers validate
/// that before decoding.
pub fn decode_rgb565(data: &[u8], width: u32, height: u32, order: ByteOrder) -> RgbImage {
    debug_assert_eq!(data.len(), width as usize * height as usize * 2);
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for pair in data.chunks_exact(2) {
        let word = match order {
            ByteOrder::Little => u16::from_le_bytes([pair[0], pair[1]]),
            ByteOrder::Big => u16::from_be_bytes([pair[0], pair[1]]),
        };
        let r = ((word >> 11) & 0x1F) as u8;
        let g = ((word >> 5) & 0x3F) as u8;
        let b = (word & 0x1F) as u8;
        rgb.push((r << 3) | (r >> 2));
        rgb.push((g << 2) | (g >> 4));
        rgb.push((b << 3) | (b >> 2));
    }
    RgbImage::from_raw(width, height, rgb).expect("sized buffer")
}

/// Mean absolute pixel-to-pixel difference along both axes, summed over the
/// RGB channels. Lower is smoother.
pub fn smoothness(img: &RgbImage) -> f64 {
    let (width, height) = img.dimensions();
    let mut total: u64 = 0;
    let mut count: u64 = 0;

    for y in 0..height {
        for x in 1..width {
            let a = img.get_pixel(x, y).0;
            let b = img.get_pixel(x - 1, y).0;
            total += pixel_delta(a, b);
            count += 1;
        }
    }
    for y in 1..height {
        for x in 0..width {
            let a = img.get_pixel(x, y).0;
            let b = img.get_pixel(x, y - 1).0;
            total += pixel_delta(a, b);
            count += 1;
        }
    }

    if count == 0 { 0.0 } else { total as f64 / count as f64 }
}

fn pixel_delta(a: [u8; 3], b: [u8; 3]) -> u64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum()
}

/// Decode under both byte orders and keep the smoother candidate. Ties go to
/// little-endian.
pub fn disambiguate(data: &[u8], width: u32, height: u32) -> (RgbImage, DisambiguationReport) {
    let little = decode_rgb565(data, width, height, ByteOrder::Little);
    let big = decode_rgb565(data, width, height, ByteOrder::Big);
    let little_score = smoothness(&little);
    let big_score = smoothness(&big);

    let (order, image) = if little_score <= big_score {
        (ByteOrder::Little, little)
    } else {
        (ByteOrder::Big, big)
    };
    tracing::debug!(
        "disambiguated {}x{} as {} (little {:.3}, big {:.3})",
        width,
        height,
        order.as_str(),
        little_score,
        big_score
    );
    (
        image,
        DisambiguationReport {
            order,
            little_score,
            big_score,
        },
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smooth diagonal gradient packed in the given byte order.
    pub(crate) fn gradient_rgb565(width: u32, height: u32, order: ByteOrder) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 2) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = ((x + y) * 255 / (width + height - 2).max(1)) as u16;
                let word = ((v >> 3) << 11) | ((v >> 2) << 5) | (v >> 3);
                let bytes = match order {
                    ByteOrder::Little => word.to_le_bytes(),
                    ByteOrder::Big => word.to_be_bytes(),
                };
                data.extend_from_slice(&bytes);
            }
        }
        data
    }

    #[test]
    fn test_gradient_smoother_than_its_swapped_twin() {
        let data = gradient_rgb565(64, 48, ByteOrder::Little);
        let correct = decode_rgb565(&data, 64, 48, ByteOrder::Little);
        let swapped = decode_rgb565(&data, 64, 48, ByteOrder::Big);
        assert!(smoothness(&correct) < smoothness(&swapped));
    }

    #[test]
    fn test_disambiguate_picks_little_for_le_payload() {
        let data = gradient_rgb565(320, 240, ByteOrder::Little);
        let (image, report) = disambiguate(&data, 320, 240);
        assert_eq!(report.order, ByteOrder::Little);
        assert!(report.little_score < report.big_score);
        assert_eq!(image.dimensions(), (320, 240));
        // The chosen decode is the smooth one.
        assert_eq!(image, decode_rgb565(&data, 320, 240, ByteOrder::Little));
    }

    #[test]
    fn test_disambiguate_picks_big_for_be_payload() {
        let data = gradient_rgb565(320, 240, ByteOrder::Big);
        let (_, report) = disambiguate(&data, 320, 240);
        assert_eq!(report.order, ByteOrder::Big);
        assert!(report.big_score < report.little_score);
    }

    #[test]
    fn test_both_scores_are_reported() {
        let data = gradient_rgb565(32, 32, ByteOrder::Little);
        let (_, report) = disambiguate(&data, 32, 32);
        assert!(report.little_score >= 0.0);
        assert!(report.big_score >= 0.0);
    }

    #[test]
    fn test_tie_goes_to_little() {
        // A constant image with symmetric bytes scores 0 either way.
        let data = vec![0u8; 16 * 16 * 2];
        let (_, report) = disambiguate(&data, 16, 16);
        assert_eq!(report.little_score, report.big_score);
        assert_eq!(report.order, ByteOrder::Little);
    }
}
