//! Maps `Box<dyn Error>` from trait boundaries to typed `RigError`.
//!
//! The traits in `puller_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `puller_hardware::HwError` downcasting.

use crate::error::RigError;

/// Map a trait-boundary error to a typed `RigError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> RigError {
    #[cfg(feature = "hardware-errors")]
    {
        use puller_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => RigError::Timeout,
                other => RigError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        RigError::Timeout
    } else {
        RigError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_detects_timeouts() {
        let e = std::io::Error::other("spi Timeout on read");
        assert!(matches!(map_hw_error(&e), RigError::Timeout));
        let e = std::io::Error::other("bus stuck");
        assert!(matches!(map_hw_error(&e), RigError::Hardware(m) if m == "bus stuck"));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hardware_errors_are_downcast() {
        use puller_hardware::error::HwError;
        let e = HwError::CalibrationFailed;
        assert!(matches!(map_hw_error(&e), RigError::HardwareFault(_)));
        assert!(matches!(map_hw_error(&HwError::Timeout), RigError::Timeout));
    }
}
