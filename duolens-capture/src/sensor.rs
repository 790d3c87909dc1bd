//! The device seam: a dual-image sensor with one powered side at a time.

use duolens_core::{Frame, Side};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a sensor backend.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("device not present: {0}")]
    NotPresent(String),

    #[error("device reset failed: {0}")]
    ResetFailed(String),

    #[error("snapshot failed: {0}")]
    SnapshotFailed(String),
}

/// A dual-image sensor behind a power-select mux.
///
/// `power_select` routes the mux; the device exposes no ready signal, so the
/// caller must wait `settle_delay` before trusting the switch. `grab` returns
/// a frame tagged with the side the backend believes is powered; the
/// selector cross-checks that tag against its own state.
pub trait StereoSensor {
    /// Route power to one side of the pair. Side effect only; the switch is
    /// not trusted until `settle_delay` has elapsed.
    fn power_select(&mut self, side: Side);

    /// Snapshot from the currently powered side.
    fn grab(&mut self) -> Result<Frame, SensorError>;

    /// Full device reset, reconfiguring both sides.
    fn reset(&mut self) -> Result<(), SensorError>;

    /// Fixed wait after a power switch before a capture is valid.
    fn settle_delay(&self) -> Duration;

    /// L+R capture pairs to run and discard after (re)initialization, while
    /// automatic exposure/gain settles.
    fn warmup_pairs(&self) -> u32;
}
