//! Side-selecting capture for a dual-image sensor.
//!
//! The device exposes exactly one active side at a time; this crate provides
//! the `StereoSensor` seam over that hardware, a deterministic simulated
//! backend, and the `SideSelector` state machine that guarantees a captured
//! frame's side tag always matches the selection at the instant of capture.

pub mod selector;
pub mod sensor;
pub mod simulated;

pub use selector::{CaptureFault, SelectorState, SideSelector};
pub use sensor::{SensorError, StereoSensor};
pub use simulated::SimulatedSensor;
