//! `From` implementations bridging `puller_config` types to `puller_core` types.

use crate::config::{
    ControlCfg, DiagnosticsCfg, InputsCfg, MotionCfg, RigCfg, RigSettings, SensorCfg,
};
use crate::force::ForceCalibration;

// ── SensorCfg ────────────────────────────────────────────────────────────────

impl From<&puller_config::SensorCfg> for SensorCfg {
    fn from(c: &puller_config::SensorCfg) -> Self {
        Self {
            slope: c.slope,
            offset: c.offset,
            ema_alpha: c.ema_alpha.unwrap_or(0.0),
            read_timeout_ms: c.read_timeout_ms,
            flush_samples: c.flush_samples,
            startup_retry_ms: c.startup_retry_ms,
            max_consecutive_failures: c.max_consecutive_failures,
        }
    }
}

// ── MotionCfg ────────────────────────────────────────────────────────────────

impl From<&puller_config::MotionCfg> for MotionCfg {
    fn from(c: &puller_config::MotionCfg) -> Self {
        Self {
            steps_per_rev: c.steps_per_rev,
            mm_per_rev: c.mm_per_rev,
            max_speed: c.max_speed as f32,
            acceleration: c.acceleration as f32,
            active_current_ma: c.active_current_ma,
            idle_current_ma: c.idle_current_ma,
        }
    }
}

// ── InputsCfg ────────────────────────────────────────────────────────────────

impl From<&puller_config::InputsCfg> for InputsCfg {
    fn from(c: &puller_config::InputsCfg) -> Self {
        Self {
            button_debounce_ms: c.button_debounce_ms,
            limit_debounce_ms: c.limit_debounce_ms,
            buttons_active_low: c.buttons_active_low,
            limit_active_low: c.limit_active_low,
        }
    }
}

// ── DiagnosticsCfg ───────────────────────────────────────────────────────────

impl From<&puller_config::DiagnosticsCfg> for DiagnosticsCfg {
    fn from(c: &puller_config::DiagnosticsCfg) -> Self {
        Self {
            interval_ms: c.interval_ms,
            stop_on_fault: c.stop_on_fault,
        }
    }
}

// ── Whole config ─────────────────────────────────────────────────────────────

impl From<&puller_config::Config> for RigSettings {
    fn from(c: &puller_config::Config) -> Self {
        Self {
            sensor: (&c.sensor).into(),
            motion: (&c.motion).into(),
            inputs: (&c.inputs).into(),
            rig: RigCfg {
                speed: i32::try_from(c.motion.speed).unwrap_or(i32::MAX),
                retract_mm: c.homing.retract_mm,
                break_ratio: c.break_detect.ratio,
                stop_at_limit: c.safety.stop_at_limit,
            },
            diagnostics: (&c.diagnostics).into(),
            control: ControlCfg {
                cycle_us: c.control.cycle_us,
            },
        }
    }
}

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<puller_config::ForceCalibration> for ForceCalibration {
    fn from(c: puller_config::ForceCalibration) -> Self {
        Self {
            slope: c.slope,
            offset: c.offset,
        }
    }
}
