use puller_traits::FaultFlag;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum RigError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("timeout waiting for load cell")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("cancelled before the rig was ready")]
    Cancelled,
    #[error("aborted: {0}")]
    Abort(AbortReason),
}

/// Why an active motion was halted before reaching its goal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("force sensor stopped responding")]
    SensorFailure,
    #[error("limit switch reached while opening")]
    EndOfTravel,
    #[error("driver fault: {0}")]
    DriverFault(FaultFlag),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing load cell")]
    MissingLoadCell,
    #[error("missing stepper")]
    MissingStepper,
    #[error("missing motor driver")]
    MissingDriver,
    #[error("missing digital inputs")]
    MissingInputs,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
