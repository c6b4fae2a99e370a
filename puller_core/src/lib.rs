#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Rig control logic (hardware-agnostic).
//!
//! Every device is reached through the `puller_traits` capability traits, so
//! the same controller runs against the simulated rig and real hardware.
//!
//! ## Architecture
//!
//! - **Force**: load-cell bring-up, linear calibration, EMA smoothing (`force`)
//! - **Motion**: velocity/position control and run/hold current (`actuator`)
//! - **Inputs**: time-window debounce for buttons and the limit switch (`inputs`)
//! - **Diagnostics**: periodic driver fault polling (`diagnostics`)
//! - **Commands**: text protocol tokenizer (`command`)
//! - **State machine**: modes, homing, break detection, safety stops (`rig`)
//! - **Controller**: the per-cycle loop tying it together (`controller`)
//!
//! ## Control cycle
//!
//! One call to `RigController::cycle` updates inputs, handles at most one
//! command line, samples force, steps the state machine, pumps the stepper,
//! polls diagnostics when due and emits a telemetry line. Nothing blocks
//! except the bounded load-cell read.

pub mod actuator;
pub mod builder;
pub mod command;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod diagnostics;
pub mod error;
pub mod force;
pub mod hw_error;
pub mod inputs;
pub mod lines;
pub mod rig;
pub mod status;
pub mod telemetry;

pub use actuator::{MotionActuator, MotionMode, PositionReading};
pub use builder::{InputLines, RigBuilder, build_rig};
pub use command::{Command, parse};
pub use config::RigSettings;
pub use controller::{Rig, RigController, RunOptions, RunSummary, StopReason};
pub use error::{AbortReason, BuildError, Result, RigError};
pub use force::{ForceCalibration, ForceReading, ForceSensor, LowPassFilter};
pub use inputs::{Debounced, InputState, Polarity, RigInputs};
pub use lines::ChannelLines;
pub use rig::{Dispatch, HomingPhase, RigMode, RigStateMachine};
pub use status::{Completion, RigStatus};
pub use telemetry::{RecordingOutput, RigOutput, RigReport, TelemetryLine, WriterOutput};
