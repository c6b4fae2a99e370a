//! The control loop: one owner for every rig component.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use puller_traits::{Clock, LineSource, LoadCell, MotorDriver, Stepper};

use crate::actuator::MotionActuator;
use crate::command;
use crate::config::RigSettings;
use crate::diagnostics::DiagnosticsMonitor;
use crate::error::{AbortReason, Result};
use crate::force::ForceSensor;
use crate::inputs::{InputState, RigInputs};
use crate::rig::{Dispatch, RigMode, RigStateMachine};
use crate::status::RigStatus;
use crate::telemetry::{RigOutput, RigReport, TelemetryLine};

/// Boxed controller as produced by `RigBuilder`.
pub type Rig = RigController<Box<dyn LoadCell>, Box<dyn Stepper>, Box<dyn MotorDriver>>;

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    MaxCycles,
    /// Input closed and the rig went idle.
    InputDrained,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub max_cycles: Option<u64>,
    /// Return once the line source is closed and no motion is active.
    pub until_idle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub completed: u32,
    pub aborted: u32,
    pub stop: StopReason,
}

pub struct RigController<L: LoadCell, S: Stepper, D: MotorDriver> {
    pub(crate) sensor: ForceSensor<L>,
    pub(crate) actuator: MotionActuator<S, D>,
    pub(crate) inputs: RigInputs,
    pub(crate) diagnostics: DiagnosticsMonitor,
    pub(crate) rig: RigStateMachine,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) settings: RigSettings,
    sensor_failures: u32,
    cycles: u64,
}

impl<L: LoadCell, S: Stepper, D: MotorDriver> std::fmt::Debug for RigController<L, S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigController")
            .field("mode", &self.rig.mode())
            .field("actuator", &self.actuator)
            .field("inputs", &self.inputs)
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl<L: LoadCell, S: Stepper, D: MotorDriver> RigController<L, S, D> {
    pub(crate) fn from_parts(
        sensor: ForceSensor<L>,
        actuator: MotionActuator<S, D>,
        inputs: RigInputs,
        settings: RigSettings,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            sensor,
            diagnostics: DiagnosticsMonitor::new(&settings.diagnostics),
            rig: RigStateMachine::new(settings.rig.clone()),
            actuator,
            inputs,
            clock,
            epoch,
            settings,
            sensor_failures: 0,
            cycles: 0,
        }
    }

    /// Configure the driver and bring up the load cell.
    ///
    /// Blocks until the load cell answers; `shutdown` cancels the retries.
    /// Timestamps restart at zero once this returns.
    pub fn startup(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.actuator.configure().wrap_err("configuring actuator")?;
        self.sensor
            .start(&*self.clock, shutdown)
            .wrap_err("starting force sensor")?;
        self.epoch = self.clock.now();
        self.diagnostics = DiagnosticsMonitor::new(&self.settings.diagnostics);
        self.sensor_failures = 0;
        tracing::info!("rig ready");
        Ok(())
    }

    /// Run one control cycle.
    pub fn cycle(&mut self, lines: &mut dyn LineSource, out: &mut dyn RigOutput) -> Result<RigStatus> {
        let now = self.now_ms();
        self.inputs.update(now);
        let input = self.inputs.snapshot();

        let dispatched = self.handle_line(lines, out)?;
        if !dispatched {
            self.rig.apply_buttons(&input, &mut self.actuator)?;
        }

        let force = match self.sensor.sample(now) {
            Ok(r) => {
                self.sensor_failures = 0;
                Some(r.force)
            }
            Err(e) => {
                self.sensor_failures = self.sensor_failures.saturating_add(1);
                tracing::warn!(failures = self.sensor_failures, error = %e, "force sample failed");
                None
            }
        };

        let mut status = if self.sensor_failures >= self.settings.sensor.max_consecutive_failures.max(1)
            && !self.rig.is_idle()
        {
            self.rig.abort(AbortReason::SensorFailure, &mut self.actuator)?
        } else {
            self.rig.step(&mut self.actuator, force, &input)?
        };
        report_status(&status, out);

        self.actuator.tick()?;

        let actuator = &mut self.actuator;
        let flags = self.diagnostics.poll_if_due(now, || actuator.read_faults());
        for flag in &flags {
            out.report(&RigReport::Fault(*flag));
        }
        if let Some(flag) = self.diagnostics.escalation(&flags)
            && !self.rig.is_idle()
        {
            status = self.rig.abort(AbortReason::DriverFault(flag), &mut self.actuator)?;
            report_status(&status, out);
        }

        if let Some(force) = force {
            out.telemetry(&TelemetryLine {
                timestamp_ms: now,
                force,
                travel_mm: self.actuator.position().travel_mm,
            });
        }

        self.cycles = self.cycles.saturating_add(1);
        tracing::trace!(cycle = self.cycles, mode = ?self.rig.mode(), "cycle");
        Ok(status)
    }

    /// Loop cycles until shutdown, the cycle limit, or (with `until_idle`)
    /// drained input and an idle rig. The motor is stopped on every exit path.
    pub fn run(
        &mut self,
        lines: &mut dyn LineSource,
        out: &mut dyn RigOutput,
        shutdown: &AtomicBool,
        opts: RunOptions,
    ) -> Result<RunSummary> {
        let period = Duration::from_micros(self.settings.control.cycle_us);
        let mut completed = 0u32;
        let mut aborted = 0u32;
        let mut cycles = 0u64;

        let stop = loop {
            if shutdown.load(Ordering::Relaxed) {
                break StopReason::Shutdown;
            }
            if opts.max_cycles.is_some_and(|max| cycles >= max) {
                break StopReason::MaxCycles;
            }
            match self.cycle(lines, out) {
                Ok(RigStatus::Complete(_)) => completed += 1,
                Ok(RigStatus::Aborted(_)) => aborted += 1,
                Ok(_) => {}
                Err(e) => {
                    if let Err(stop_err) = self.rig.halt(&mut self.actuator) {
                        tracing::error!(error = %stop_err, "failed to stop motor after error");
                    }
                    return Err(e);
                }
            }
            cycles += 1;
            if opts.until_idle && lines.is_closed() && self.rig.is_idle() {
                break StopReason::InputDrained;
            }
            self.clock.sleep(period);
        };

        self.rig.halt(&mut self.actuator).wrap_err("stopping motor")?;
        tracing::info!(cycles, completed, aborted, ?stop, "run finished");
        Ok(RunSummary {
            cycles,
            completed,
            aborted,
            stop,
        })
    }

    /// Stop any motion and go idle.
    pub fn stop(&mut self) -> Result<()> {
        self.rig.halt(&mut self.actuator)
    }

    pub fn mode(&self) -> RigMode {
        self.rig.mode()
    }

    pub fn actuator(&self) -> &MotionActuator<S, D> {
        &self.actuator
    }

    pub fn inputs(&self) -> InputState {
        self.inputs.snapshot()
    }

    pub fn last_force(&self) -> Option<f32> {
        self.sensor.last().map(|r| r.force)
    }

    /// Milliseconds since startup completed.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn settings(&self) -> &RigSettings {
        &self.settings
    }

    fn handle_line(&mut self, lines: &mut dyn LineSource, out: &mut dyn RigOutput) -> Result<bool> {
        let Some(line) = lines.poll_line() else {
            return Ok(false);
        };
        if line.trim().is_empty() {
            return Ok(false);
        }
        let cmd = command::parse(&line);
        match self.rig.dispatch(&cmd, &mut self.actuator)? {
            Dispatch::Accepted => Ok(true),
            Dispatch::Rejected(raw) => {
                out.report(&RigReport::InvalidCommand(raw));
                Ok(false)
            }
        }
    }
}

fn report_status(status: &RigStatus, out: &mut dyn RigOutput) {
    match status {
        RigStatus::Complete(c) => out.report(&RigReport::Completed(*c)),
        RigStatus::Aborted(reason) => out.report(&RigReport::Aborted(*reason)),
        RigStatus::Idle | RigStatus::Running => {}
    }
}
