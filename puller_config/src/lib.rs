#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and force-calibration parsing for the pillar puller rig.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - The calibration CSV loader enforces headers and fits a force line
//!   (`force = slope * raw + offset`) by ordinary least squares.
use serde::Deserialize;

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,force
///
/// Example:
/// raw,force
/// 3000,0.0
/// 9000,10.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub force: f32,
}

/// BCM pin numbers.
///
/// Only the three digital inputs are opened by this process. `step`, `dir`
/// and `spi_cs` are read by the motion and driver backends, not by the
/// controller.
#[derive(Debug, Deserialize)]
pub struct Pins {
    pub open_button: u8,
    pub close_button: u8,
    pub limit_switch: u8,
    pub step: u8,
    pub dir: u8,
    pub spi_cs: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    /// Calibrated force units per ADC count.
    pub slope: f32,
    /// Force at raw == 0.
    pub offset: f32,
    /// Optional EMA smoothing factor in (0.0, 1.0]; absent disables smoothing.
    pub ema_alpha: Option<f32>,
    pub read_timeout_ms: u64,
    /// Readings discarded after the device comes up.
    pub flush_samples: u32,
    /// Backoff between startup attempts (probe and internal calibration).
    pub startup_retry_ms: u64,
    /// Consecutive failed reads tolerated before motion is halted.
    pub max_consecutive_failures: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            slope: 1.0 / 600.0,
            offset: -5.0,
            ema_alpha: None,
            read_timeout_ms: 100,
            flush_samples: 10,
            startup_retry_ms: 1000,
            max_consecutive_failures: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Manual and command-driven travel speed, steps per second.
    pub speed: u32,
    /// Ceiling for absolute moves, applied to the stepper at startup.
    pub max_speed: u32,
    /// Steps per second squared, used by absolute moves.
    pub acceleration: u32,
    pub steps_per_rev: u32,
    pub mm_per_rev: f32,
    pub active_current_ma: u16,
    pub idle_current_ma: u16,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            speed: 1500,
            max_speed: 10_000,
            acceleration: 50_000,
            steps_per_rev: 3200,
            mm_per_rev: 2.0,
            active_current_ma: 1000,
            idle_current_ma: 400,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InputsCfg {
    pub button_debounce_ms: u64,
    pub limit_debounce_ms: u64,
    /// Treat a low line as pressed.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HomingCfg {
    /// Distance backed off the switch after it closes, in mm.
    pub retract_mm: f32,
}

impl Default for HomingCfg {
    fn default() -> Self {
        Self { retract_mm: 22.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BreakDetectCfg {
    /// A sample below `previous * ratio` is a break.
    pub ratio: f32,
}

impl Default for BreakDetectCfg {
    fn default() -> Self {
        Self { ratio: 0.8 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiagnosticsCfg {
    pub interval_ms: u64,
    /// Halt motion on overtemperature or short-to-ground instead of only reporting.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SafetyCfg {
    /// Halt opening motions when the limit switch closes.
    pub stop_at_limit: bool,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            stop_at_limit: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Pause between control cycles, microseconds.
    pub cycle_us: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self { cycle_us: 1000 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Physical model used by the simulated backend.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    pub limit_mm: f32,
    pub contact_mm: f32,
    pub stiffness_n_per_mm: f32,
    pub break_at_mm: Option<f32>,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            limit_mm: 30.0,
            contact_mm: 2.0,
            stiffness_n_per_mm: 5.0,
            break_at_mm: Some(6.0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub sensor: SensorCfg,
    #[serde(default)]
    pub motion: MotionCfg,
    #[serde(default)]
    pub inputs: InputsCfg,
    #[serde(default)]
    pub homing: HomingCfg,
    #[serde(default)]
    pub break_detect: BreakDetectCfg,
    #[serde(default)]
    pub diagnostics: DiagnosticsCfg,
    #[serde(default)]
    pub safety: SafetyCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Fitted load-cell line: force = slope * raw + offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceCalibration {
    pub slope: f32,
    pub offset: f32,
}

impl ForceCalibration {
    /// Ordinary least squares over all rows, computed in f64.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        let n = rows.len() as f64;
        let mean_x = rows.iter().map(|r| r.raw as f64).sum::<f64>() / n;
        let mean_y = rows.iter().map(|r| f64::from(r.force)).sum::<f64>() / n;
        let (sxx, sxy) = rows.iter().fold((0.0f64, 0.0f64), |(sxx, sxy), r| {
            let dx = r.raw as f64 - mean_x;
            let dy = f64::from(r.force) - mean_y;
            (sxx + dx * dx, sxy + dx * dy)
        });
        if !sxx.is_finite() || sxx == 0.0 {
            eyre::bail!("calibration cannot determine slope (all raw values identical)");
        }
        let slope = sxy / sxx;
        if !slope.is_finite() || slope == 0.0 {
            eyre::bail!("calibration produced an invalid slope");
        }
        let offset = mean_y - slope * mean_x;
        Ok(Self {
            slope: slope as f32,
            offset: offset as f32,
        })
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<ForceCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != ["raw", "force"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,force', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    ForceCalibration::from_rows(&rows)
}

impl Config {
    /// Replace the `[sensor]` line with a fitted calibration.
    pub fn apply_calibration(&mut self, cal: ForceCalibration) {
        self.sensor.slope = cal.slope;
        self.sensor.offset = cal.offset;
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        if !self.sensor.slope.is_finite() || self.sensor.slope == 0.0 {
            eyre::bail!("sensor.slope must be finite and non-zero");
        }
        if !self.sensor.offset.is_finite() {
            eyre::bail!("sensor.offset must be finite");
        }
        if let Some(alpha) = self.sensor.ema_alpha
            && !(alpha > 0.0 && alpha <= 1.0)
        {
            eyre::bail!("sensor.ema_alpha must be in (0.0, 1.0]");
        }
        if self.sensor.read_timeout_ms == 0 {
            eyre::bail!("sensor.read_timeout_ms must be >= 1");
        }
        if self.sensor.startup_retry_ms == 0 {
            eyre::bail!("sensor.startup_retry_ms must be >= 1");
        }
        if self.sensor.max_consecutive_failures == 0 {
            eyre::bail!("sensor.max_consecutive_failures must be >= 1");
        }

        // Motion
        if self.motion.speed == 0 {
            eyre::bail!("motion.speed must be > 0");
        }
        if self.motion.max_speed < self.motion.speed {
            eyre::bail!("motion.max_speed must be >= motion.speed");
        }
        if self.motion.acceleration == 0 {
            eyre::bail!("motion.acceleration must be > 0");
        }
        if self.motion.steps_per_rev == 0 {
            eyre::bail!("motion.steps_per_rev must be > 0");
        }
        if !(self.motion.mm_per_rev.is_finite() && self.motion.mm_per_rev > 0.0) {
            eyre::bail!("motion.mm_per_rev must be > 0");
        }
        if self.motion.idle_current_ma > self.motion.active_current_ma {
            eyre::bail!("motion.idle_current_ma must be <= motion.active_current_ma");
        }
        if self.motion.active_current_ma == 0 {
            eyre::bail!("motion.active_current_ma must be > 0");
        }

        // Inputs
        if self.inputs.button_debounce_ms > 1000 || self.inputs.limit_debounce_ms > 1000 {
            eyre::bail!("inputs debounce windows must be <= 1000 ms");
        }

        // Homing
        if !(self.homing.retract_mm.is_finite() && self.homing.retract_mm >= 0.0) {
            eyre::bail!("homing.retract_mm must be >= 0");
        }

        // Break detection
        if !(self.break_detect.ratio > 0.0 && self.break_detect.ratio < 1.0) {
            eyre::bail!("break_detect.ratio must be in (0.0, 1.0)");
        }

        // Diagnostics
        if self.diagnostics.interval_ms == 0 {
            eyre::bail!("diagnostics.interval_ms must be >= 1");
        }

        // Control
        if self.control.cycle_us > 1_000_000 {
            eyre::bail!("control.cycle_us is unreasonably large (>1s)");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Sim
        if self.sim.stiffness_n_per_mm < 0.0 {
            eyre::bail!("sim.stiffness_n_per_mm must be >= 0");
        }

        Ok(())
    }
}
