//! Rig state machine.
//!
//! Owns the operating mode and turns commands, button intent and sensor
//! readings into actuator calls. Long-running modes are step functions: each
//! control cycle calls `step` once, so a new command can always preempt the
//! current motion.

use puller_traits::{MotorDriver, Stepper};

use crate::actuator::MotionActuator;
use crate::command::Command;
use crate::config::RigCfg;
use crate::error::{AbortReason, Result};
use crate::inputs::InputState;
use crate::status::{Completion, RigStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    /// Driving toward the limit switch.
    Seeking,
    /// Backing off by the retract distance after the switch closed.
    Retracting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RigMode {
    Idle,
    Opening,
    Closing,
    MovingToPosition { target_mm: i32 },
    MovingToForce { target: f32 },
    Homing(HomingPhase),
    BreakWatch,
}

impl RigMode {
    /// Modes that drive the carriage toward the limit switch.
    fn is_opening(self) -> bool {
        matches!(
            self,
            RigMode::Opening | RigMode::MovingToForce { .. } | RigMode::BreakWatch
        )
    }
}

/// Who asked for the current open/close motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holder {
    Button,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Accepted,
    /// Unrecognized input; the mode is unchanged.
    Rejected(String),
}

#[derive(Debug)]
pub struct RigStateMachine {
    cfg: RigCfg,
    mode: RigMode,
    holder: Holder,
    previous_force: Option<f32>,
}

impl RigStateMachine {
    pub fn new(cfg: RigCfg) -> Self {
        Self {
            cfg,
            mode: RigMode::Idle,
            holder: Holder::Button,
            previous_force: None,
        }
    }

    pub fn mode(&self) -> RigMode {
        self.mode
    }

    pub fn is_idle(&self) -> bool {
        self.mode == RigMode::Idle
    }

    pub fn cfg(&self) -> &RigCfg {
        &self.cfg
    }

    /// Apply one operator command.
    ///
    /// `Stop` is accepted in any mode. Any other valid command first halts
    /// the active motion and then enters its own mode.
    pub fn dispatch<S: Stepper, D: MotorDriver>(
        &mut self,
        command: &Command,
        act: &mut MotionActuator<S, D>,
    ) -> Result<Dispatch> {
        if let Command::Invalid(raw) = command {
            tracing::warn!(line = %raw, "invalid command");
            return Ok(Dispatch::Rejected(raw.clone()));
        }
        tracing::info!(%command, from = ?self.mode, "command");

        if *command == Command::Stop {
            self.halt(act)?;
            return Ok(Dispatch::Accepted);
        }
        if !self.is_idle() {
            self.halt(act)?;
        }

        let speed = self.cfg.speed;
        match *command {
            Command::Open => {
                act.set_velocity(speed)?;
                self.enter(RigMode::Opening, Holder::Command);
            }
            Command::Close => {
                act.set_velocity(-speed)?;
                self.enter(RigMode::Closing, Holder::Command);
            }
            Command::MoveToPosition(target_mm) => {
                let steps = act.mm_to_steps(target_mm as f32);
                act.move_to_absolute(steps)?;
                tracing::info!(target_mm, steps, "move to position");
                self.enter(RigMode::MovingToPosition { target_mm }, Holder::Command);
            }
            Command::MoveToForce(target) => {
                act.set_velocity(speed)?;
                self.enter(
                    RigMode::MovingToForce {
                        target: target as f32,
                    },
                    Holder::Command,
                );
            }
            Command::Home => {
                act.set_velocity(speed)?;
                self.enter(RigMode::Homing(HomingPhase::Seeking), Holder::Command);
            }
            Command::OpenUntilBreak => {
                act.set_velocity(speed)?;
                self.previous_force = None;
                self.enter(RigMode::BreakWatch, Holder::Command);
            }
            Command::Stop | Command::Invalid(_) => {}
        }
        Ok(Dispatch::Accepted)
    }

    /// Follow the open/close buttons while no command owns the motion.
    ///
    /// Velocity is only written when the button-driven mode changes.
    pub fn apply_buttons<S: Stepper, D: MotorDriver>(
        &mut self,
        inputs: &InputState,
        act: &mut MotionActuator<S, D>,
    ) -> Result<()> {
        let button_owned = match self.mode {
            RigMode::Idle => true,
            RigMode::Opening | RigMode::Closing => self.holder == Holder::Button,
            _ => false,
        };
        if !button_owned {
            return Ok(());
        }

        let blocked = self.cfg.stop_at_limit && inputs.limit_pressed;
        let wanted = match (inputs.open_pressed, inputs.close_pressed) {
            (true, false) if !blocked => RigMode::Opening,
            (false, true) => RigMode::Closing,
            _ => RigMode::Idle,
        };
        if wanted == self.mode {
            return Ok(());
        }

        let velocity = match wanted {
            RigMode::Opening => self.cfg.speed,
            RigMode::Closing => -self.cfg.speed,
            _ => 0,
        };
        act.set_velocity(velocity)?;
        self.enter(wanted, Holder::Button);
        Ok(())
    }

    /// Advance the active mode by one control cycle. Call before `actuator.tick()`.
    ///
    /// `force` is `None` when this cycle produced no sample; force-dependent
    /// conditions are then skipped.
    pub fn step<S: Stepper, D: MotorDriver>(
        &mut self,
        act: &mut MotionActuator<S, D>,
        force: Option<f32>,
        inputs: &InputState,
    ) -> Result<RigStatus> {
        if self.cfg.stop_at_limit && inputs.limit_pressed && self.drives_toward_limit(act) {
            return self.abort(AbortReason::EndOfTravel, act);
        }

        match self.mode {
            RigMode::Idle => Ok(RigStatus::Idle),
            RigMode::Opening | RigMode::Closing => Ok(RigStatus::Running),
            RigMode::MovingToPosition { .. } => {
                if act.remaining_steps() == 0 {
                    let steps = act.current_position();
                    self.finish(act, Completion::PositionReached { steps })
                } else {
                    Ok(RigStatus::Running)
                }
            }
            RigMode::MovingToForce { target } => match force {
                Some(f) if f >= target => self.finish(act, Completion::ForceReached { force: f }),
                _ => Ok(RigStatus::Running),
            },
            RigMode::Homing(HomingPhase::Seeking) => {
                if inputs.limit_pressed {
                    act.set_velocity(0)?;
                    act.set_position(0);
                    let retract = act.mm_to_steps(self.cfg.retract_mm);
                    act.move_to_absolute(-retract)?;
                    tracing::info!(retract_steps = retract, "limit found, retracting");
                    self.mode = RigMode::Homing(HomingPhase::Retracting);
                }
                Ok(RigStatus::Running)
            }
            RigMode::Homing(HomingPhase::Retracting) => {
                if act.remaining_steps() == 0 {
                    act.set_velocity(0)?;
                    act.set_position(0);
                    self.mode = RigMode::Idle;
                    tracing::info!("homing complete");
                    Ok(RigStatus::Complete(Completion::Homed))
                } else {
                    Ok(RigStatus::Running)
                }
            }
            RigMode::BreakWatch => {
                let Some(current) = force else {
                    return Ok(RigStatus::Running);
                };
                // Single-sample threshold; a noisy sensor can trip it early.
                // Assumes tensile (positive) force: a steady negative reading also trips it.
                if let Some(previous) = self.previous_force
                    && current < previous * self.cfg.break_ratio
                {
                    return self.finish(act, Completion::BreakDetected { previous, current });
                }
                self.previous_force = Some(current);
                Ok(RigStatus::Running)
            }
        }
    }

    /// Stop the motor and return to `Idle`. Safe to call repeatedly.
    pub fn halt<S: Stepper, D: MotorDriver>(&mut self, act: &mut MotionActuator<S, D>) -> Result<()> {
        if !self.is_idle() {
            tracing::info!(from = ?self.mode, "halt");
        }
        self.mode = RigMode::Idle;
        self.holder = Holder::Button;
        self.previous_force = None;
        act.set_velocity(0)
    }

    /// Halt for a safety reason.
    pub fn abort<S: Stepper, D: MotorDriver>(
        &mut self,
        reason: AbortReason,
        act: &mut MotionActuator<S, D>,
    ) -> Result<RigStatus> {
        tracing::warn!(%reason, mode = ?self.mode, "motion aborted");
        self.halt(act)?;
        Ok(RigStatus::Aborted(reason))
    }

    fn finish<S: Stepper, D: MotorDriver>(
        &mut self,
        act: &mut MotionActuator<S, D>,
        completion: Completion,
    ) -> Result<RigStatus> {
        tracing::info!(%completion, "motion complete");
        self.halt(act)?;
        Ok(RigStatus::Complete(completion))
    }

    /// Opening modes, plus an absolute move whose target lies ahead in +.
    fn drives_toward_limit<S: Stepper, D: MotorDriver>(&self, act: &MotionActuator<S, D>) -> bool {
        match self.mode {
            RigMode::MovingToPosition { .. } => act.remaining_steps() > 0,
            mode => mode.is_opening(),
        }
    }

    fn enter(&mut self, mode: RigMode, holder: Holder) {
        tracing::info!(?mode, ?holder, "mode");
        self.mode = mode;
        self.holder = holder;
    }
}
