//! Motion actuator: velocity and absolute-position control over a `Stepper`,
//! with run/hold current management on the `MotorDriver`.

use eyre::WrapErr;
use puller_traits::{DriverFaultFlags, MotorDriver, Stepper};

use crate::config::MotionCfg;
use crate::error::Result;
use crate::hw_error::map_hw_error;

/// Carriage position in both units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    pub steps: i64,
    pub travel_mm: f32,
}

/// What `tick` pumps on the stepper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    /// Constant speed, steps/s. Zero means holding.
    Velocity(i32),
    /// Accelerated move to an absolute step target.
    Position(i64),
}

pub struct MotionActuator<S: Stepper, D: MotorDriver> {
    stepper: S,
    driver: D,
    cfg: MotionCfg,
    mode: MotionMode,
    applied_current_ma: Option<u16>,
}

impl<S: Stepper, D: MotorDriver> std::fmt::Debug for MotionActuator<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionActuator")
            .field("mode", &self.mode)
            .field("position", &self.stepper.current_position())
            .field("applied_current_ma", &self.applied_current_ma)
            .finish()
    }
}

impl<S: Stepper, D: MotorDriver> MotionActuator<S, D> {
    pub fn new(stepper: S, driver: D, cfg: MotionCfg) -> Self {
        Self {
            stepper,
            driver,
            cfg,
            mode: MotionMode::Velocity(0),
            applied_current_ma: None,
        }
    }

    /// Startup: profile limits, hold current, zero speed, position 0.
    pub fn configure(&mut self) -> Result<()> {
        self.applied_current_ma = None;
        self.stepper
            .set_max_speed(self.cfg.max_speed)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set_max_speed")?;
        self.stepper
            .set_acceleration(self.cfg.acceleration)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set_acceleration")?;
        self.stepper
            .set_speed(0.0)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set_speed")?;
        self.stepper.set_current_position(0);
        self.mode = MotionMode::Velocity(0);
        self.apply_current(self.cfg.idle_current_ma)
    }

    /// Switch to constant-velocity mode. Non-zero speeds run at active current.
    pub fn set_velocity(&mut self, steps_per_sec: i32) -> Result<()> {
        let current = if steps_per_sec == 0 {
            self.cfg.idle_current_ma
        } else {
            self.cfg.active_current_ma
        };
        self.apply_current(current)?;
        self.stepper
            .set_speed(steps_per_sec as f32)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set_speed")?;
        if self.mode != MotionMode::Velocity(steps_per_sec) {
            tracing::debug!(steps_per_sec, "velocity");
        }
        self.mode = MotionMode::Velocity(steps_per_sec);
        Ok(())
    }

    /// Switch to position mode and start an accelerated move to `target_steps`.
    pub fn move_to_absolute(&mut self, target_steps: i64) -> Result<()> {
        self.apply_current(self.cfg.active_current_ma)?;
        self.stepper
            .move_to(target_steps)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("move_to")?;
        tracing::debug!(target_steps, "move to absolute");
        self.mode = MotionMode::Position(target_steps);
        Ok(())
    }

    /// Steps left on the absolute move; 0 in velocity mode.
    pub fn remaining_steps(&self) -> i64 {
        match self.mode {
            MotionMode::Position(_) => self.stepper.distance_to_go(),
            MotionMode::Velocity(_) => 0,
        }
    }

    pub fn current_position(&self) -> i64 {
        self.stepper.current_position()
    }

    /// Redefine the current position. Drops any pending absolute move.
    pub fn set_position(&mut self, steps: i64) {
        self.stepper.set_current_position(steps);
        self.mode = MotionMode::Velocity(0);
    }

    /// Pump the stepper once. Call exactly once per control cycle.
    pub fn tick(&mut self) -> Result<bool> {
        let r = match self.mode {
            MotionMode::Velocity(_) => self.stepper.run_speed(),
            MotionMode::Position(_) => self.stepper.run(),
        };
        r.map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("stepper tick")
    }

    pub fn position(&self) -> PositionReading {
        let steps = self.stepper.current_position();
        PositionReading {
            steps,
            travel_mm: self.steps_to_mm(steps),
        }
    }

    pub fn mm_to_steps(&self, mm: f32) -> i64 {
        self.cfg.mm_to_steps(mm)
    }

    pub fn steps_to_mm(&self, steps: i64) -> f32 {
        self.cfg.steps_to_mm(steps)
    }

    pub fn mode(&self) -> MotionMode {
        self.mode
    }

    /// Commanded speed in velocity mode; 0 during absolute moves.
    pub fn velocity(&self) -> i32 {
        match self.mode {
            MotionMode::Velocity(v) => v,
            MotionMode::Position(_) => 0,
        }
    }

    pub fn read_faults(&mut self) -> Result<DriverFaultFlags> {
        self.driver
            .read_faults()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading driver faults")
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn cfg(&self) -> &MotionCfg {
        &self.cfg
    }

    fn apply_current(&mut self, milliamps: u16) -> Result<()> {
        if self.applied_current_ma == Some(milliamps) {
            return Ok(());
        }
        self.driver
            .set_rms_current(milliamps)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set_rms_current")?;
        tracing::trace!(milliamps, "driver current");
        self.applied_current_ma = Some(milliamps);
        Ok(())
    }
}
