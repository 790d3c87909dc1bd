//! Device-side configuration.
//!
//! Every knob has a default tuned for a QVGA sensor on a slow link; a JSON
//! file overrides any subset of them.

use crate::link::SupervisorConfig;
use crate::transport::TransportConfig;
use duolens_core::{PixelFormat, StreamMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// All device-side knobs. Fixed for the whole session at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Capture width in pixels.
    pub width: u32,
    /// Capture height in pixels.
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub mode: StreamMode,
    /// JPEG quality for compressed mode (10-95).
    pub jpeg_quality: u8,
    /// Pause between the left and right capture of one round.
    pub switch_ms: u64,
    /// Minimum interval between sends.
    pub send_interval_ms: u64,
    /// Bodies larger than this are written in chunks of this size.
    pub chunk_bytes: usize,
    /// Per-send response timeout.
    pub response_timeout_ms: u64,
    /// Extra attempts per send after the first.
    pub retries: u32,
    /// Pause between local retry attempts.
    pub retry_pause_ms: u64,
    /// Backoff after a fully-failed round: base + step * consecutive failures.
    pub backoff_base_ms: u64,
    pub backoff_step_ms: u64,
    /// Consecutive fully-failed rounds before a forced reconnect.
    pub failure_threshold: u32,
    /// Selector re-initialization attempts before the loop idles out.
    pub reinit_attempts: u32,
    /// Idle-spin interval once the sensor is declared unrecoverable.
    pub idle_spin_ms: u64,
    /// Warm-up capture pairs after (re)initialization.
    pub warmup_pairs: u32,
    /// Settle delay after a side switch.
    pub settle_ms: u64,
    /// Collector address, host:port.
    pub server_addr: String,
    /// Send one stitched [L|R] image instead of two per-side payloads.
    pub stitch: bool,
    /// Include the X-Frame-Id header.
    pub send_frame_id: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            pixel_format: PixelFormat::Rgb565,
            mode: StreamMode::Compressed,
            jpeg_quality: 60,
            switch_ms: 200,
            send_interval_ms: 1200,
            chunk_bytes: 512,
            response_timeout_ms: 12_000,
            retries: 2,
            retry_pause_ms: 250,
            backoff_base_ms: 500,
            backoff_step_ms: 500,
            failure_threshold: 3,
            reinit_attempts: 3,
            idle_spin_ms: 1000,
            warmup_pairs: 15,
            settle_ms: 30,
            server_addr: "127.0.0.1:5005".to_string(),
            stitch: true,
            send_frame_id: true,
        }
    }
}

impl StreamConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn switch_interval(&self) -> Duration {
        Duration::from_millis(self.switch_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn idle_spin_interval(&self) -> Duration {
        Duration::from_millis(self.idle_spin_ms)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            chunk_bytes: self.chunk_bytes,
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            retries: self.retries,
            retry_pause: Duration::from_millis(self.retry_pause_ms),
        }
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            failure_threshold: self.failure_threshold,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_step: Duration::from_millis(self.backoff_step_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: StreamConfig =
            serde_json::from_str(r#"{"jpeg_quality": 85, "stitch": false}"#).unwrap();
        assert_eq!(cfg.jpeg_quality, 85);
        assert!(!cfg.stitch);
        assert_eq!(cfg.width, 320);
        assert_eq!(cfg.chunk_bytes, 512);
    }

    #[test]
    fn test_mode_and_format_tags() {
        let cfg: StreamConfig =
            serde_json::from_str(r#"{"mode": "raw", "pixel_format": "grayscale"}"#).unwrap();
        assert_eq!(cfg.mode, StreamMode::Raw);
        assert_eq!(cfg.pixel_format, PixelFormat::Grayscale);
    }
}
