//! Simulated sensor backend.
//!
//! Generates deterministic gradient frames so the device binary runs without
//! hardware. Left frames ramp horizontally, right frames vertically, with a
//! slow per-frame phase shift so successive frames differ.

use crate::sensor::{SensorError, StereoSensor};
use duolens_core::{Frame, PixelFormat, Side};
use std::time::Duration;
use tracing::{debug, info};

/// Deterministic stand-in for the physical stereo sensor.
pub struct SimulatedSensor {
    width: u32,
    height: u32,
    format: PixelFormat,
    powered: Side,
    frame_count: u64,
    settle: Duration,
    warmup: u32,
}

impl SimulatedSensor {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        info!("simulated sensor: {}x{} {:?}", width, height, format);
        Self {
            width,
            height,
            format,
            powered: Side::Left,
            frame_count: 0,
            settle: Duration::from_millis(30),
            warmup: 5,
        }
    }

    /// Override the settle delay (the hardware default is 30ms).
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Override the warm-up pair count.
    pub fn with_warmup_pairs(mut self, warmup: u32) -> Self {
        self.warmup = warmup;
        self
    }

    /// Pack an RGB triple into little-endian RGB565.
    fn pack565(r: u8, g: u8, b: u8) -> [u8; 2] {
        let word = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
        word.to_le_bytes()
    }

    fn sample(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let phase = (self.frame_count % 256) as u32;
        match self.powered {
            // Left: horizontal ramp.
            Side::Left => {
                let v = ((x * 255 / self.width.max(1)) + phase) as u8;
                (v, v, v)
            }
            // Right: vertical ramp.
            Side::Right => {
                let v = ((y * 255 / self.height.max(1)) + phase) as u8;
                (v, v, v)
            }
        }
    }
}

impl StereoSensor for SimulatedSensor {
    fn power_select(&mut self, side: Side) {
        self.powered = side;
    }

    fn grab(&mut self) -> Result<Frame, SensorError> {
        let mut data =
            Vec::with_capacity(self.width as usize * self.height as usize * self.format.bytes_per_pixel());
        for y in 0..self.height {
            for x in 0..self.width {
                let (r, g, b) = self.sample(x, y);
                match self.format {
                    PixelFormat::Rgb565 => data.extend_from_slice(&Self::pack565(r, g, b)),
                    PixelFormat::Grayscale => data.push(r),
                }
            }
        }
        self.frame_count += 1;
        debug!("simulated grab {} on {}", self.frame_count, self.powered);

        Frame::new(self.powered, self.width, self.height, self.format, data)
            .map_err(|e| SensorError::SnapshotFailed(e.to_string()))
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        self.powered = Side::Left;
        self.frame_count = 0;
        Ok(())
    }

    fn settle_delay(&self) -> Duration {
        self.settle
    }

    fn warmup_pairs(&self) -> u32 {
        self.warmup
    }
}
