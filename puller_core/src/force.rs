//! Force sensor adapter: load-cell bring-up, count conversion and smoothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use puller_traits::{Clock, LoadCell};

use crate::config::SensorCfg;
use crate::error::{Result, RigError};
use crate::hw_error::map_hw_error;

/// One converted load-cell sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceReading {
    pub raw: i32,
    /// Calibrated (and optionally smoothed) force in newtons.
    pub force: f32,
    pub timestamp_ms: u64,
}

/// Linear count-to-force model: `force = slope * raw + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceCalibration {
    pub slope: f32,
    pub offset: f32,
}

impl Default for ForceCalibration {
    fn default() -> Self {
        Self {
            slope: 1.0 / 600.0,
            offset: -5.0,
        }
    }
}

impl ForceCalibration {
    #[inline]
    pub fn to_force(&self, raw: i32) -> f32 {
        self.slope * raw as f32 + self.offset
    }
}

/// Exponential moving average. The first sample passes through unchanged.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    alpha: f32,
    state: Option<f32>,
}

impl LowPassFilter {
    /// `alpha` is clamped into [0, 1]; 0 turns the filter into a pass-through.
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { alpha, state: None }
    }

    pub fn filter(&mut self, x: f32) -> f32 {
        if self.alpha <= 0.0 {
            return x;
        }
        let y = match self.state {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.state = Some(y);
        y
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn value(&self) -> Option<f32> {
        self.state
    }
}

/// Owns the load cell and turns raw counts into `ForceReading`s.
pub struct ForceSensor<L: LoadCell> {
    cell: L,
    calibration: ForceCalibration,
    filter: LowPassFilter,
    timeout: Duration,
    flush_samples: u32,
    retry: Duration,
    last: Option<ForceReading>,
}

impl<L: LoadCell> std::fmt::Debug for ForceSensor<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceSensor")
            .field("calibration", &self.calibration)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl<L: LoadCell> ForceSensor<L> {
    pub fn new(cell: L, cfg: &SensorCfg) -> Self {
        Self {
            cell,
            calibration: ForceCalibration {
                slope: cfg.slope,
                offset: cfg.offset,
            },
            filter: LowPassFilter::new(cfg.ema_alpha),
            timeout: Duration::from_millis(cfg.read_timeout_ms),
            flush_samples: cfg.flush_samples,
            retry: Duration::from_millis(cfg.startup_retry_ms),
            last: None,
        }
    }

    /// Bring the load cell up, retrying until it answers or `shutdown` is set.
    ///
    /// Probe failures and internal-calibration failures are retried
    /// indefinitely with a fixed backoff. The flush readings in between are
    /// discarded and their errors ignored.
    pub fn start(&mut self, clock: &dyn Clock, shutdown: &AtomicBool) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Err(eyre::Report::new(RigError::Cancelled));
            }
            attempt = attempt.saturating_add(1);
            match self.cell.begin() {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "load cell not found, retrying");
                    clock.sleep(self.retry);
                }
            }
        }

        for _ in 0..self.flush_samples {
            let _ = self.cell.read(self.timeout);
        }

        attempt = 0;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Err(eyre::Report::new(RigError::Cancelled));
            }
            attempt = attempt.saturating_add(1);
            match self.cell.calibrate_internal() {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "load cell calibration failed, retrying");
                    clock.sleep(self.retry);
                }
            }
        }

        self.filter.reset();
        self.last = None;
        tracing::info!(
            slope = self.calibration.slope,
            offset = self.calibration.offset,
            "load cell ready"
        );
        Ok(())
    }

    /// Read one sample. Blocks until the ADC has data, bounded by the read timeout.
    pub fn sample(&mut self, now_ms: u64) -> Result<ForceReading> {
        let raw = self
            .cell
            .read(self.timeout)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading load cell")?;
        let force = self.filter.filter(self.calibration.to_force(raw));
        let reading = ForceReading {
            raw,
            force,
            timestamp_ms: now_ms,
        };
        tracing::trace!(raw, force, "force sample");
        self.last = Some(reading);
        Ok(reading)
    }

    pub fn last(&self) -> Option<ForceReading> {
        self.last
    }

    pub fn calibration(&self) -> ForceCalibration {
        self.calibration
    }
}
