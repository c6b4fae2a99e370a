//! Runtime configuration used by the rig controller.
//!
//! These are separate from the TOML-deserialized structs in `puller_config`;
//! see `conversions` for the mapping.

/// Load-cell conversion and bring-up.
#[derive(Debug, Clone)]
pub struct SensorCfg {
    /// force = slope * raw + offset
    pub slope: f32,
    pub offset: f32,
    /// EMA smoothing factor; 0.0 disables smoothing. Range (0.0, 1.0] otherwise.
    pub ema_alpha: f32,
    pub read_timeout_ms: u64,
    pub flush_samples: u32,
    pub startup_retry_ms: u64,
    pub max_consecutive_failures: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            slope: 1.0 / 600.0,
            offset: -5.0,
            ema_alpha: 0.0,
            read_timeout_ms: 100,
            flush_samples: 10,
            startup_retry_ms: 1000,
            max_consecutive_failures: 50,
        }
    }
}

/// Lead-screw geometry and current levels.
#[derive(Debug, Clone)]
pub struct MotionCfg {
    pub steps_per_rev: u32,
    /// Carriage travel per motor revolution.
    pub mm_per_rev: f32,
    /// Profile limits for absolute moves.
    pub max_speed: f32,
    pub acceleration: f32,
    pub active_current_ma: u16,
    pub idle_current_ma: u16,
}

impl MotionCfg {
    /// Carriage travel to motor steps, rounded to the nearest step.
    pub fn mm_to_steps(&self, mm: f32) -> i64 {
        let steps = f64::from(mm) / f64::from(self.mm_per_rev) * f64::from(self.steps_per_rev);
        steps.round() as i64
    }

    pub fn steps_to_mm(&self, steps: i64) -> f32 {
        (steps as f64 / f64::from(self.steps_per_rev) * f64::from(self.mm_per_rev)) as f32
    }
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            steps_per_rev: 3200,
            mm_per_rev: 2.0,
            max_speed: 10_000.0,
            acceleration: 50_000.0,
            active_current_ma: 1000,
            idle_current_ma: 400,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputsCfg {
    pub button_debounce_ms: u64,
    pub limit_debounce_ms: u64,
    pub buttons_active_low: bool,
    pub limit_active_low: bool,
}

impl Default for InputsCfg {
    fn default() -> Self {
        Self {
            button_debounce_ms: 50,
            limit_debounce_ms: 5,
            buttons_active_low: true,
            limit_active_low: true,
        }
    }
}

/// State-machine parameters.
#[derive(Debug, Clone)]
pub struct RigCfg {
    /// Travel speed for open/close/homing/force moves, steps per second.
    pub speed: i32,
    pub retract_mm: f32,
    pub break_ratio: f32,
    pub stop_at_limit: bool,
}

impl Default for RigCfg {
    fn default() -> Self {
        Self {
            speed: 1500,
            retract_mm: 22.0,
            break_ratio: 0.8,
            stop_at_limit: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsCfg {
    pub interval_ms: u64,
    pub stop_on_fault: bool,
}

impl Default for DiagnosticsCfg {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            stop_on_fault: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Pause between cycles in `RigController::run`, microseconds.
    pub cycle_us: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self { cycle_us: 1000 }
    }
}

/// Everything the controller needs, grouped by component.
#[derive(Debug, Clone, Default)]
pub struct RigSettings {
    pub sensor: SensorCfg,
    pub motion: MotionCfg,
    pub inputs: InputsCfg,
    pub rig: RigCfg,
    pub diagnostics: DiagnosticsCfg,
    pub control: ControlCfg,
}
