//! `RigBuilder` for boxed devices and the generic `build_rig` constructor.
//!
//! Both paths share `validate_and_build`, the single place where settings are
//! checked before a controller exists.

use std::sync::Arc;

use puller_traits::{Clock, DigitalInput, LoadCell, MonotonicClock, MotorDriver, Stepper};

use crate::actuator::MotionActuator;
use crate::config::RigSettings;
use crate::controller::{Rig, RigController};
use crate::error::{BuildError, Result};
use crate::force::{ForceCalibration, ForceSensor};
use crate::inputs::RigInputs;

/// The three digital lines, in `open, close, limit` order.
pub struct InputLines {
    pub open: Box<dyn DigitalInput>,
    pub close: Box<dyn DigitalInput>,
    pub limit: Box<dyn DigitalInput>,
}

/// Builder for the boxed `Rig`. Missing devices are reported by `build()`.
#[derive(Default)]
pub struct RigBuilder {
    load_cell: Option<Box<dyn LoadCell>>,
    stepper: Option<Box<dyn Stepper>>,
    driver: Option<Box<dyn MotorDriver>>,
    inputs: Option<InputLines>,
    settings: Option<RigSettings>,
    calibration: Option<ForceCalibration>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl RigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_cell(mut self, cell: impl LoadCell + 'static) -> Self {
        self.load_cell = Some(Box::new(cell));
        self
    }

    pub fn with_stepper(mut self, stepper: impl Stepper + 'static) -> Self {
        self.stepper = Some(Box::new(stepper));
        self
    }

    pub fn with_driver(mut self, driver: impl MotorDriver + 'static) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    pub fn with_inputs(
        mut self,
        open: impl DigitalInput + 'static,
        close: impl DigitalInput + 'static,
        limit: impl DigitalInput + 'static,
    ) -> Self {
        self.inputs = Some(InputLines {
            open: Box::new(open),
            close: Box::new(close),
            limit: Box::new(limit),
        });
        self
    }

    pub fn with_settings(mut self, settings: RigSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Override the sensor slope/offset from `settings`.
    pub fn with_calibration(mut self, calibration: ForceCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Rig> {
        let load_cell = self
            .load_cell
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLoadCell))?;
        let stepper = self
            .stepper
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStepper))?;
        let driver = self
            .driver
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDriver))?;
        let inputs = self
            .inputs
            .ok_or_else(|| eyre::Report::new(BuildError::MissingInputs))?;

        let mut settings = self.settings.unwrap_or_default();
        if let Some(cal) = self.calibration {
            settings.sensor.slope = cal.slope;
            settings.sensor.offset = cal.offset;
        }
        validate_and_build(load_cell, stepper, driver, inputs, settings, self.clock)
    }
}

/// Construct a controller over concrete device types.
pub fn build_rig<L: LoadCell, S: Stepper, D: MotorDriver>(
    load_cell: L,
    stepper: S,
    driver: D,
    inputs: InputLines,
    settings: RigSettings,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<RigController<L, S, D>> {
    validate_and_build(load_cell, stepper, driver, inputs, settings, clock)
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate_and_build<L: LoadCell, S: Stepper, D: MotorDriver>(
    load_cell: L,
    stepper: S,
    driver: D,
    inputs: InputLines,
    settings: RigSettings,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<RigController<L, S, D>> {
    // ── Validation ───────────────────────────────────────────────────────────
    let s = &settings;
    if s.rig.speed <= 0 {
        return Err(invalid("speed must be > 0"));
    }
    if s.motion.steps_per_rev == 0 {
        return Err(invalid("steps_per_rev must be > 0"));
    }
    if !(s.motion.mm_per_rev.is_finite() && s.motion.mm_per_rev > 0.0) {
        return Err(invalid("mm_per_rev must be > 0"));
    }
    if !(s.motion.max_speed.is_finite() && s.motion.max_speed >= s.rig.speed as f32) {
        return Err(invalid("max_speed must be >= speed"));
    }
    if !(s.motion.acceleration.is_finite() && s.motion.acceleration > 0.0) {
        return Err(invalid("acceleration must be > 0"));
    }
    if s.motion.idle_current_ma > s.motion.active_current_ma {
        return Err(invalid("idle current must be <= active current"));
    }
    if !(s.sensor.slope.is_finite() && s.sensor.slope != 0.0) || !s.sensor.offset.is_finite() {
        return Err(invalid("sensor calibration must be finite with non-zero slope"));
    }
    if !(0.0..=1.0).contains(&s.sensor.ema_alpha) {
        return Err(invalid("ema_alpha must be in [0, 1]"));
    }
    if s.sensor.max_consecutive_failures == 0 {
        return Err(invalid("max_consecutive_failures must be >= 1"));
    }
    if !(s.rig.break_ratio > 0.0 && s.rig.break_ratio < 1.0) {
        return Err(invalid("break ratio must be in (0, 1)"));
    }
    if !(s.rig.retract_mm.is_finite() && s.rig.retract_mm >= 0.0) {
        return Err(invalid("retract_mm must be >= 0"));
    }
    if s.diagnostics.interval_ms == 0 {
        return Err(invalid("diagnostics interval must be >= 1 ms"));
    }

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicClock::new()),
    };

    let sensor = ForceSensor::new(load_cell, &settings.sensor);
    let actuator = MotionActuator::new(stepper, driver, settings.motion.clone());
    let inputs = RigInputs::new(inputs.open, inputs.close, inputs.limit, &settings.inputs);
    Ok(RigController::from_parts(sensor, actuator, inputs, settings, clock))
}
