//! Simulated rig.
//!
//! All simulated devices share one physical carriage position (in steps), so
//! moving the stepper changes what the load cell and limit switch observe.
//! Time comes from the injected `Clock`; with a `ManualClock` the whole rig
//! is deterministic.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use puller_traits::{Clock, DigitalInput, DriverFaultFlags, LoadCell, MotorDriver, Stepper};
use tracing::{debug, trace};

use crate::error::HwError;

/// Largest time step a simulated device integrates at once.
const MAX_DT_S: f64 = 0.05;
/// Floor speed for the accelerated mover so decelerating moves always land.
const MIN_PROFILE_SPEED: f64 = 50.0;

/// Physical model of the simulated rig.
#[derive(Debug, Clone)]
pub struct SimRigCfg {
    pub steps_per_rev: u32,
    pub mm_per_rev: f32,
    /// Carriage travel (mm from power-on position) at which the limit switch closes.
    pub limit_mm: f32,
    /// Travel at which the specimen starts carrying load.
    pub contact_mm: f32,
    pub stiffness_n_per_mm: f32,
    /// Travel at which the specimen fails; `None` never breaks.
    pub break_at_mm: Option<f32>,
    /// Fraction of the peak force left after failure.
    pub residual_ratio: f32,
    /// Load-cell calibration the simulated ADC inverts (force = slope * raw + offset).
    pub slope: f32,
    pub offset: f32,
    pub max_speed: f32,
    pub acceleration: f32,
}

impl Default for SimRigCfg {
    fn default() -> Self {
        Self {
            steps_per_rev: 3200,
            mm_per_rev: 2.0,
            limit_mm: 30.0,
            contact_mm: 2.0,
            stiffness_n_per_mm: 5.0,
            break_at_mm: Some(6.0),
            residual_ratio: 0.1,
            slope: 1.0 / 600.0,
            offset: -5.0,
            max_speed: 10_000.0,
            acceleration: 50_000.0,
        }
    }
}

impl SimRigCfg {
    fn steps_per_mm(&self) -> f64 {
        f64::from(self.steps_per_rev) / f64::from(self.mm_per_rev)
    }

    fn mm_to_steps(&self, mm: f32) -> i64 {
        (f64::from(mm) * self.steps_per_mm()).round() as i64
    }
}

/// Factory for a set of simulated devices sharing one carriage.
pub struct SimRig {
    cfg: SimRigCfg,
    carriage: Rc<Cell<i64>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SimRig {
    pub fn new(cfg: SimRigCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            cfg,
            carriage: Rc::new(Cell::new(0)),
            clock,
        }
    }

    pub fn cfg(&self) -> &SimRigCfg {
        &self.cfg
    }

    /// Physical carriage position in steps from power-on.
    pub fn carriage_steps(&self) -> i64 {
        self.carriage.get()
    }

    /// Teleport the carriage (test setup only).
    pub fn place_carriage_mm(&self, mm: f32) {
        self.carriage.set(self.cfg.mm_to_steps(mm));
    }

    pub fn stepper(&self) -> SimStepper {
        SimStepper {
            carriage: self.carriage.clone(),
            origin: self.carriage.get(),
            clock: self.clock.clone(),
            last_tick: None,
            speed: 0.0,
            target: 0,
            velocity: 0.0,
            max_speed: f64::from(self.cfg.max_speed),
            acceleration: f64::from(self.cfg.acceleration),
            carry: 0.0,
        }
    }

    pub fn load_cell(&self) -> SimLoadCell {
        SimLoadCell {
            carriage: self.carriage.clone(),
            cfg: self.cfg.clone(),
            broken: false,
            peak_force: 0.0,
            begin_failures: 0,
            calibration_failures: 0,
            begun: false,
        }
    }

    pub fn driver(&self) -> SimDriver {
        SimDriver::default()
    }

    pub fn limit_switch(&self) -> SimLimitSwitch {
        SimLimitSwitch {
            carriage: self.carriage.clone(),
            limit_steps: self.cfg.mm_to_steps(self.cfg.limit_mm),
        }
    }

    /// Released active-low button (line idles high).
    pub fn button(&self) -> SimButton {
        SimButton::default()
    }
}

// ── Stepper ──────────────────────────────────────────────────────────────────

pub struct SimStepper {
    carriage: Rc<Cell<i64>>,
    /// Physical carriage position that corresponds to logical zero.
    origin: i64,
    clock: Arc<dyn Clock + Send + Sync>,
    last_tick: Option<Instant>,
    speed: f64,
    target: i64,
    velocity: f64,
    max_speed: f64,
    acceleration: f64,
    carry: f64,
}

impl SimStepper {
    fn take_dt(&mut self) -> f64 {
        let now = self.clock.now();
        let dt = self
            .last_tick
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);
        dt.as_secs_f64().min(MAX_DT_S)
    }

    fn advance(&mut self, delta: i64) {
        if delta != 0 {
            self.carriage.set(self.carriage.get().saturating_add(delta));
        }
    }

    /// Current profile velocity of the accelerated mover, steps/s.
    pub fn velocity(&self) -> f64 {
        self.velocity
    }
}

impl Stepper for SimStepper {
    fn set_speed(&mut self, steps_per_sec: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.speed = f64::from(steps_per_sec).clamp(-self.max_speed, self.max_speed);
        Ok(())
    }

    fn move_to(&mut self, target: i64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        trace!(target, "sim stepper move_to");
        self.target = target;
        Ok(())
    }

    fn distance_to_go(&self) -> i64 {
        self.target - self.current_position()
    }

    fn run(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let dt = self.take_dt();
        let distance = self.distance_to_go();
        if distance == 0 {
            self.velocity = 0.0;
            self.carry = 0.0;
            return Ok(false);
        }
        let dir = distance.signum() as f64;
        // Reversal: shed the old direction before accelerating again.
        let mut v = if self.velocity * dir < 0.0 {
            0.0
        } else {
            self.velocity.abs()
        };
        let stopping = v * v / (2.0 * self.acceleration);
        if (distance.unsigned_abs() as f64) <= stopping {
            v -= self.acceleration * dt;
        } else {
            v += self.acceleration * dt;
        }
        v = v.clamp(MIN_PROFILE_SPEED, self.max_speed);

        self.carry += v * dt * dir;
        let mut whole = self.carry.trunc() as i64;
        self.carry -= whole as f64;
        if whole.unsigned_abs() >= distance.unsigned_abs() {
            whole = distance;
            self.carry = 0.0;
        }
        self.advance(whole);
        self.velocity = v * dir;
        Ok(self.distance_to_go() != 0)
    }

    fn run_speed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let dt = self.take_dt();
        if self.speed == 0.0 {
            self.carry = 0.0;
            return Ok(false);
        }
        self.carry += self.speed * dt;
        let whole = self.carry.trunc() as i64;
        self.carry -= whole as f64;
        self.advance(whole);
        Ok(whole != 0)
    }

    fn current_position(&self) -> i64 {
        self.carriage.get() - self.origin
    }

    fn set_max_speed(&mut self, steps_per_sec: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !(steps_per_sec.is_finite() && steps_per_sec > 0.0) {
            return Err(Box::new(HwError::InvalidParam(format!("max speed {steps_per_sec}"))));
        }
        self.max_speed = f64::from(steps_per_sec);
        self.speed = self.speed.clamp(-self.max_speed, self.max_speed);
        Ok(())
    }

    fn set_acceleration(&mut self, steps_per_sec2: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !(steps_per_sec2.is_finite() && steps_per_sec2 > 0.0) {
            return Err(Box::new(HwError::InvalidParam(format!("acceleration {steps_per_sec2}"))));
        }
        self.acceleration = f64::from(steps_per_sec2);
        Ok(())
    }

    fn set_current_position(&mut self, position: i64) {
        self.origin = self.carriage.get() - position;
        self.target = position;
        self.velocity = 0.0;
        self.speed = 0.0;
        self.carry = 0.0;
    }
}

// ── Load cell ────────────────────────────────────────────────────────────────

/// Linear-elastic specimen that fails at a fixed travel.
pub struct SimLoadCell {
    carriage: Rc<Cell<i64>>,
    cfg: SimRigCfg,
    broken: bool,
    peak_force: f32,
    begin_failures: u32,
    calibration_failures: u32,
    begun: bool,
}

impl SimLoadCell {
    /// Fail the first `n` probes with `NotFound`.
    pub fn with_begin_failures(mut self, n: u32) -> Self {
        self.begin_failures = n;
        self
    }

    /// Fail the first `n` internal calibrations.
    pub fn with_calibration_failures(mut self, n: u32) -> Self {
        self.calibration_failures = n;
        self
    }

    /// Force the specimen currently carries, in calibrated units.
    pub fn force(&mut self) -> f32 {
        let travel_mm = (self.carriage.get() as f64 / self.cfg.steps_per_mm()) as f32;
        if let Some(at) = self.cfg.break_at_mm
            && !self.broken
            && travel_mm >= at
        {
            self.broken = true;
            debug!(travel_mm, peak = self.peak_force, "sim specimen failed");
        }
        let elastic = self.cfg.stiffness_n_per_mm * (travel_mm - self.cfg.contact_mm).max(0.0);
        if self.broken {
            self.peak_force * self.cfg.residual_ratio
        } else {
            self.peak_force = self.peak_force.max(elastic);
            elastic
        }
    }
}

impl LoadCell for SimLoadCell {
    fn begin(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.begin_failures > 0 {
            self.begin_failures -= 1;
            return Err(Box::new(HwError::NotFound("NAU7802".to_string())));
        }
        self.begun = true;
        Ok(())
    }

    fn calibrate_internal(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.calibration_failures > 0 {
            self.calibration_failures -= 1;
            return Err(Box::new(HwError::CalibrationFailed));
        }
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        if !self.begun {
            return Err(Box::new(HwError::NotFound("NAU7802".to_string())));
        }
        let force = self.force();
        let raw = ((force - self.cfg.offset) / self.cfg.slope).round();
        Ok(raw as i32)
    }
}

// ── Motor driver ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DriverState {
    current_ma: u16,
    current_writes: Vec<u16>,
    faults: DriverFaultFlags,
    fault_reads: u32,
}

/// Simulated driver chip. Clones share state, so a test can keep one handle
/// to inject faults and inspect current writes.
#[derive(Debug, Clone, Default)]
pub struct SimDriver {
    state: Rc<RefCell<DriverState>>,
}

impl SimDriver {
    pub fn current_ma(&self) -> u16 {
        self.state.borrow().current_ma
    }

    /// Every current level written so far, in order.
    pub fn current_writes(&self) -> Vec<u16> {
        self.state.borrow().current_writes.clone()
    }

    pub fn set_faults(&self, faults: DriverFaultFlags) {
        self.state.borrow_mut().faults = faults;
    }

    pub fn fault_reads(&self) -> u32 {
        self.state.borrow().fault_reads
    }
}

impl MotorDriver for SimDriver {
    fn set_rms_current(&mut self, milliamps: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut st = self.state.borrow_mut();
        st.current_ma = milliamps;
        st.current_writes.push(milliamps);
        Ok(())
    }

    fn read_faults(&mut self) -> Result<DriverFaultFlags, Box<dyn std::error::Error + Send + Sync>> {
        let mut st = self.state.borrow_mut();
        st.fault_reads += 1;
        Ok(st.faults)
    }
}

// ── Digital inputs ───────────────────────────────────────────────────────────

/// Momentary button wired active-low. Clones share the line level.
#[derive(Debug, Clone)]
pub struct SimButton {
    level_high: Rc<Cell<bool>>,
}

impl Default for SimButton {
    fn default() -> Self {
        Self {
            level_high: Rc::new(Cell::new(true)),
        }
    }
}

impl SimButton {
    pub fn press(&self) {
        self.level_high.set(false);
    }

    pub fn release(&self) {
        self.level_high.set(true);
    }

    /// Drive the raw line level directly (for bounce patterns).
    pub fn set_level(&self, high: bool) {
        self.level_high.set(high);
    }
}

impl DigitalInput for SimButton {
    fn is_high(&mut self) -> bool {
        self.level_high.get()
    }
}

/// Active-low limit switch closed once the carriage reaches the limit.
pub struct SimLimitSwitch {
    carriage: Rc<Cell<i64>>,
    limit_steps: i64,
}

impl DigitalInput for SimLimitSwitch {
    fn is_high(&mut self) -> bool {
        self.carriage.get() < self.limit_steps
    }
}
