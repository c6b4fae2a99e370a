//! Human-readable error descriptions and structured JSON error formatting.

use puller_core::error::{AbortReason, BuildError, RigError};

pub fn abort_reason_name(r: &AbortReason) -> &'static str {
    match r {
        AbortReason::SensorFailure => "SensorFailure",
        AbortReason::EndOfTravel => "EndOfTravel",
        AbortReason::DriverFault(_) => "DriverFault",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLoadCell => {
                "What happened: No load cell was provided to the rig.\nLikely causes: The force sensor backend failed to initialize or was not wired into the builder.\nHow to fix: Pass the load cell via with_load_cell(...).".to_string()
            }
            BuildError::MissingStepper => {
                "What happened: No stepper was provided to the rig.\nLikely causes: The motion backend was not wired into the builder.\nHow to fix: Pass the stepper via with_stepper(...).".to_string()
            }
            BuildError::MissingDriver => {
                "What happened: No motor driver was provided to the rig.\nLikely causes: The driver chip backend was not wired into the builder.\nHow to fix: Pass the driver via with_driver(...).".to_string()
            }
            BuildError::MissingInputs => {
                "What happened: Buttons and limit switch were not provided.\nLikely causes: GPIO inputs failed to open or were not wired into the builder.\nHow to fix: Pass all three lines via with_inputs(open, close, limit).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/puller.toml for a sample."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RigError>() {
        return match re {
            RigError::Timeout => "What happened: Load cell read timed out.\nLikely causes: Sensor not wired correctly, no power, or read timeout too low.\nHow to fix: Check the I2C wiring and power, and consider raising sensor.read_timeout_ms.".to_string(),
            RigError::Cancelled => "What happened: Startup was cancelled before the rig was ready.\nLikely causes: Ctrl-C while waiting for the load cell.\nHow to fix: Check that the load cell is connected, then start again.".to_string(),
            RigError::Abort(reason) => match reason {
                AbortReason::SensorFailure => "What happened: The force sensor stopped responding during a motion.\nLikely causes: Loose sensor cable or ADC fault.\nHow to fix: Check the load-cell wiring; sensor.max_consecutive_failures controls how many misses are tolerated.".to_string(),
                AbortReason::EndOfTravel => "What happened: The limit switch closed while opening.\nLikely causes: Target beyond the mechanical range.\nHow to fix: Home the rig and choose a smaller target.".to_string(),
                AbortReason::DriverFault(flag) => format!("What happened: Motor driver reported '{flag}'.\nLikely causes: Overheating or a shorted motor phase.\nHow to fix: Let the driver cool, check the motor wiring, then restart."),
            },
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,force'.".to_string();
    }

    if lower.contains("reading config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path.\nHow to fix: Pass --config FILE or create etc/puller.toml. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") || lower.contains("parsing config") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Missing [pins] or out-of-range values.\nHow to fix: Edit the TOML config and try again. Details: {msg}"
        );
    }

    if lower.contains("gpio") {
        return "What happened: Failed to open GPIO inputs.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access /dev/gpiomem.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 1 generic, 2 usage/config, 3 hardware, 4 timeout, 5 safety abort, 130 cancelled.
pub fn exit_code_for_error(err: &eyre::Report) -> u8 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if let Some(re) = err.downcast_ref::<RigError>() {
        return match re {
            RigError::Hardware(_) | RigError::HardwareFault(_) => 3,
            RigError::Timeout => 4,
            RigError::Abort(_) => 5,
            RigError::Cancelled => 130,
            RigError::Config(_) => 2,
            RigError::State(_) => 1,
        };
    }
    let lower = format!("{err:#}").to_ascii_lowercase();
    if lower.contains("config") || lower.contains("calibration") {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(RigError::Abort(reason)) = err.downcast_ref::<RigError>() {
        let detail = match reason {
            AbortReason::DriverFault(flag) => Some(json!({ "flag": flag.to_string() })),
            _ => None,
        };
        let obj = match detail {
            Some(d) => json!({ "reason": abort_reason_name(reason), "details": d, "message": humanize(err) }),
            None => json!({ "reason": abort_reason_name(reason), "message": humanize(err) }),
        };
        return obj.to_string();
    }

    json!({ "reason": "Error", "code": exit_code_for_error(err), "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_errors_map_to_usage_code() {
        let err = eyre::Report::new(BuildError::InvalidConfig("speed must be > 0"));
        assert_eq!(exit_code_for_error(&err), 2);
        assert!(humanize(&err).contains("speed must be > 0"));
    }

    #[test]
    fn abort_json_names_the_reason() {
        let err = eyre::Report::new(RigError::Abort(AbortReason::EndOfTravel));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "EndOfTravel");
        assert_eq!(exit_code_for_error(&err), 5);
    }

    #[test]
    fn cancelled_startup_exits_130() {
        let err = eyre::Report::new(RigError::Cancelled).wrap_err("starting force sensor");
        assert_eq!(exit_code_for_error(&err), 130);
    }
}
