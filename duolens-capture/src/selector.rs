//! The side-selecting capture state machine.
//!
//! Exactly one side is selected at any instant. Selection is a side effect
//! with a settle delay (the mux has no ready signal). Capture is atomic with
//! respect to selection: `capture_selected` has no await point, so the
//! active side cannot change between the state check and the grab.

use crate::sensor::{SensorError, StereoSensor};
use duolens_core::{Frame, Side};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Device-level capture faults. Any of these discards the frame entirely and
/// leaves the selector `Faulted` until a full re-initialization.
#[derive(Debug, Error)]
pub enum CaptureFault {
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("selector not ready (state {0:?})")]
    NotReady(SelectorState),

    #[error("captured frame tagged {got} while {expected} was selected")]
    SideMismatch { expected: Side, got: Side },
}

/// Selector lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Uninitialized,
    LeftActive,
    RightActive,
    Faulted,
}

impl SelectorState {
    fn active_side(&self) -> Option<Side> {
        match self {
            SelectorState::LeftActive => Some(Side::Left),
            SelectorState::RightActive => Some(Side::Right),
            _ => None,
        }
    }
}

/// Owns the sensor and enforces the select-then-capture discipline.
pub struct SideSelector<S: StereoSensor> {
    sensor: S,
    state: SelectorState,
}

impl<S: StereoSensor> SideSelector<S> {
    /// Wrap a sensor backend. The selector starts `Uninitialized`; call
    /// [`init`](Self::init) before capturing.
    pub fn new(sensor: S) -> Self {
        Self {
            sensor,
            state: SelectorState::Uninitialized,
        }
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    /// The currently selected side, if the selector is operational.
    pub fn active_side(&self) -> Option<Side> {
        self.state.active_side()
    }

    /// Full (re)initialization: reset the device, power each side once, then
    /// run the warm-up capture pairs and discard them. Ends `LeftActive`.
    ///
    /// Warm-up grabs are best effort: auto-exposure settling makes early
    /// frames unusable anyway, so a fault mid-warm-up is logged and skipped.
    /// This is the only way out of `Faulted`.
    pub async fn init(&mut self) -> Result<(), CaptureFault> {
        self.state = SelectorState::Uninitialized;
        if let Err(e) = self.sensor.reset() {
            self.state = SelectorState::Faulted;
            return Err(e.into());
        }

        // Configure both sides of the mux before the first real capture.
        for side in [Side::Left, Side::Right] {
            self.sensor.power_select(side);
            tokio::time::sleep(self.sensor.settle_delay()).await;
        }

        let pairs = self.sensor.warmup_pairs();
        for pair in 0..pairs {
            for side in [Side::Left, Side::Right] {
                self.sensor.power_select(side);
                tokio::time::sleep(self.sensor.settle_delay()).await;
                if let Err(e) = self.sensor.grab() {
                    warn!("warm-up grab {}/{} on {} failed: {}", pair + 1, pairs, side, e);
                }
            }
        }

        self.sensor.power_select(Side::Left);
        tokio::time::sleep(self.sensor.settle_delay()).await;
        self.state = SelectorState::LeftActive;
        info!("selector initialized after {} warm-up pairs", pairs);
        Ok(())
    }

    /// Select a side. Idempotent: selecting the already-active side does not
    /// touch the mux. On a change, blocks for the settle delay before the
    /// switch is trusted.
    pub async fn select(&mut self, side: Side) -> Result<(), CaptureFault> {
        match self.state.active_side() {
            None => Err(CaptureFault::NotReady(self.state)),
            Some(active) if active == side => Ok(()),
            Some(_) => {
                self.sensor.power_select(side);
                tokio::time::sleep(self.sensor.settle_delay()).await;
                self.state = match side {
                    Side::Left => SelectorState::LeftActive,
                    Side::Right => SelectorState::RightActive,
                };
                debug!("selected {}", side);
                Ok(())
            }
        }
    }

    /// Capture from the selected side. No await point between the state
    /// check and the grab, so the frame's side tag cannot go stale.
    ///
    /// Any fault moves the selector to `Faulted` and discards the frame;
    /// partial frames are never returned.
    pub fn capture_selected(&mut self) -> Result<Frame, CaptureFault> {
        let Some(active) = self.state.active_side() else {
            return Err(CaptureFault::NotReady(self.state));
        };

        let frame = match self.sensor.grab() {
            Ok(frame) => frame,
            Err(e) => {
                self.state = SelectorState::Faulted;
                return Err(e.into());
            }
        };

        if frame.side != active {
            self.state = SelectorState::Faulted;
            return Err(CaptureFault::SideMismatch {
                expected: active,
                got: frame.side,
            });
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duolens_core::PixelFormat;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Scriptable backend recording every mux switch.
    struct FakeSensor {
        powered: Side,
        selects: Vec<Side>,
        grabs: u32,
        /// Scripted grab failures, consumed in order; empty means succeed.
        failures: VecDeque<bool>,
        /// When set, grabs report this side regardless of the mux.
        lie_side: Option<Side>,
        warmup: u32,
    }

    impl FakeSensor {
        fn new(warmup: u32) -> Self {
            Self {
                powered: Side::Left,
                selects: Vec::new(),
                grabs: 0,
                failures: VecDeque::new(),
                lie_side: None,
                warmup,
            }
        }

        fn frame(&self, side: Side) -> Frame {
            Frame::new(side, 2, 2, PixelFormat::Grayscale, vec![0; 4]).unwrap()
        }
    }

    impl StereoSensor for FakeSensor {
        fn power_select(&mut self, side: Side) {
            self.powered = side;
            self.selects.push(side);
        }

        fn grab(&mut self) -> Result<Frame, SensorError> {
            self.grabs += 1;
            if self.failures.pop_front().unwrap_or(false) {
                return Err(SensorError::SnapshotFailed("scripted".into()));
            }
            Ok(self.frame(self.lie_side.unwrap_or(self.powered)))
        }

        fn reset(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn settle_delay(&self) -> Duration {
            Duration::from_millis(30)
        }

        fn warmup_pairs(&self) -> u32 {
            self.warmup
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_discards_warmup_and_ends_left_active() {
        let mut sel = SideSelector::new(FakeSensor::new(3));
        sel.init().await.unwrap();
        assert_eq!(sel.state(), SelectorState::LeftActive);
        assert_eq!(sel.sensor.grabs, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_before_init_fails() {
        let mut sel = SideSelector::new(FakeSensor::new(0));
        assert!(matches!(
            sel.capture_selected(),
            Err(CaptureFault::NotReady(SelectorState::Uninitialized))
        ));
        assert!(matches!(
            sel.select(Side::Right).await,
            Err(CaptureFault::NotReady(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_is_idempotent() {
        let mut sel = SideSelector::new(FakeSensor::new(0));
        sel.init().await.unwrap();
        let switches = sel.sensor.selects.len();
        sel.select(Side::Left).await.unwrap();
        assert_eq!(sel.sensor.selects.len(), switches);
        sel.select(Side::Right).await.unwrap();
        assert_eq!(sel.sensor.selects.len(), switches + 1);
        assert_eq!(sel.state(), SelectorState::RightActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grab_fault_moves_to_faulted_until_reinit() {
        let mut sel = SideSelector::new(FakeSensor::new(0));
        sel.init().await.unwrap();
        sel.sensor.failures.push_back(true);
        assert!(matches!(
            sel.capture_selected(),
            Err(CaptureFault::Sensor(_))
        ));
        assert_eq!(sel.state(), SelectorState::Faulted);
        // Faulted rejects everything except init.
        assert!(sel.select(Side::Right).await.is_err());
        assert!(sel.capture_selected().is_err());
        sel.init().await.unwrap();
        assert!(sel.capture_selected().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_side_mismatch_is_a_fault() {
        let mut sel = SideSelector::new(FakeSensor::new(0));
        sel.init().await.unwrap();
        sel.sensor.lie_side = Some(Side::Right);
        assert!(matches!(
            sel.capture_selected(),
            Err(CaptureFault::SideMismatch {
                expected: Side::Left,
                got: Side::Right,
            })
        ));
        assert_eq!(sel.state(), SelectorState::Faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_tolerates_grab_faults() {
        let mut sensor = FakeSensor::new(2);
        sensor.failures.push_back(true);
        let mut sel = SideSelector::new(sensor);
        sel.init().await.unwrap();
        assert_eq!(sel.state(), SelectorState::LeftActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_captured_frame_tag_tracks_selection() {
        let mut sel = SideSelector::new(FakeSensor::new(0));
        sel.init().await.unwrap();
        for side in [Side::Left, Side::Right, Side::Left, Side::Right] {
            sel.select(side).await.unwrap();
            assert_eq!(sel.capture_selected().unwrap().side, side);
        }
    }
}
