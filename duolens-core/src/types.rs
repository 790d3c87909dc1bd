//! Sides, lanes, pixel formats, stream modes, and frame identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two physical sensors in the stereo pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Single-letter wire tag.
    pub fn letter(&self) -> char {
        match self {
            Side::Left => 'L',
            Side::Right => 'R',
        }
    }

    /// The other side of the pair.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" | "l" | "left" => Ok(Side::Left),
            "R" | "r" | "right" => Ok(Side::Right),
            _ => Err(()),
        }
    }
}

/// A payload lane: one of the two sides, or the combined stitched image.
///
/// Lanes, not sides, key the one-send-in-flight limit and the frame-id tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Side(Side),
    Stitched,
}

impl Lane {
    pub fn letter(&self) -> Option<char> {
        match self {
            Lane::Side(s) => Some(s.letter()),
            Lane::Stitched => None,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Side(s) => write!(f, "{s}"),
            Lane::Stitched => write!(f, "S"),
        }
    }
}

/// Sample layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb565,
    Grayscale,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Grayscale => 1,
        }
    }

    /// Wire header tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Grayscale => "grayscale",
        }
    }
}

impl FromStr for PixelFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb565" | "rgb" => Ok(PixelFormat::Rgb565),
            "grayscale" | "gray" => Ok(PixelFormat::Grayscale),
            _ => Err(()),
        }
    }
}

/// Which encode/decode path the whole session uses. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Compressed,
    Raw,
}

/// Monotonically increasing per-session frame counter.
///
/// The L/R pair of one capture round shares a numeric id; the wire tag is the
/// id suffixed with the lane letter (`"12L"`), or the bare id for a stitched
/// send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    /// Advance to the next round's id, returning the current one.
    pub fn bump(&mut self) -> FrameId {
        let current = *self;
        self.0 += 1;
        current
    }

    /// Wire tag for the given lane.
    pub fn tag(&self, lane: Lane) -> String {
        match lane.letter() {
            Some(c) => format!("{}{}", self.0, c),
            None => format!("{}", self.0),
        }
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_letters_and_opposite() {
        assert_eq!(Side::Left.letter(), 'L');
        assert_eq!(Side::Right.letter(), 'R');
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!("R".parse::<Side>(), Ok(Side::Right));
    }

    #[test]
    fn test_pixel_format_sizes() {
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Grayscale.bytes_per_pixel(), 1);
        assert_eq!("RGB565".parse::<PixelFormat>(), Ok(PixelFormat::Rgb565));
    }

    #[test]
    fn test_frame_id_tags() {
        let mut id = FrameId(11);
        let round = id.bump();
        assert_eq!(round.tag(Lane::Side(Side::Left)), "11L");
        assert_eq!(round.tag(Lane::Side(Side::Right)), "11R");
        assert_eq!(round.tag(Lane::Stitched), "11");
        assert_eq!(id, FrameId(12));
    }
}
