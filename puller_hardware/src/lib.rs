//! Device backends for the rig controller.
//!
//! The `sim` module is always available and models the whole rig on a shared
//! carriage position. The `hardware` feature adds GPIO-backed digital inputs.

pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use sim::{SimButton, SimDriver, SimLimitSwitch, SimLoadCell, SimRig, SimRigCfg, SimStepper};
