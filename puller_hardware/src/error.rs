use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("load cell read timeout")]
    Timeout,
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("internal offset calibration failed")]
    CalibrationFailed,
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
