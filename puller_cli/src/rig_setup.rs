//! Config loading and rig assembly for the simulated and GPIO backends.

use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr;
use puller_config::Config;
use puller_core::{Rig, RigBuilder, RigSettings};
use puller_hardware::{SimRig, SimRigCfg};
use puller_traits::Clock;

/// Read, calibrate and validate the config file.
pub fn load_config(path: &Path, calibration: Option<&Path>) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let mut cfg: Config = toml::from_str(&text)
        .wrap_err_with(|| format!("parsing config {}", path.display()))?;
    if let Some(csv) = calibration {
        let cal = puller_config::load_calibration_csv(csv)?;
        tracing::info!(slope = cal.slope, offset = cal.offset, "calibration loaded");
        cfg.apply_calibration(cal);
    }
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Physical model for the simulator, taken from `[sim]` plus the rig geometry.
pub fn sim_cfg(cfg: &Config) -> SimRigCfg {
    SimRigCfg {
        steps_per_rev: cfg.motion.steps_per_rev,
        mm_per_rev: cfg.motion.mm_per_rev,
        limit_mm: cfg.sim.limit_mm,
        contact_mm: cfg.sim.contact_mm,
        stiffness_n_per_mm: cfg.sim.stiffness_n_per_mm,
        break_at_mm: cfg.sim.break_at_mm,
        slope: cfg.sensor.slope,
        offset: cfg.sensor.offset,
        max_speed: cfg.motion.max_speed as f32,
        acceleration: cfg.motion.acceleration as f32,
        ..SimRigCfg::default()
    }
}

/// Assemble a rig on the simulator. The simulator handle is returned so the
/// caller can inspect or script the physical model.
pub fn build_sim_rig(cfg: &Config, clock: Arc<dyn Clock + Send + Sync>) -> eyre::Result<(Rig, SimRig)> {
    let sim = SimRig::new(sim_cfg(cfg), clock.clone());
    let rig = RigBuilder::new()
        .with_load_cell(sim.load_cell())
        .with_stepper(sim.stepper())
        .with_driver(sim.driver())
        .with_inputs(sim.button(), sim.button(), sim.limit_switch())
        .with_settings(RigSettings::from(cfg))
        .with_clock(clock)
        .build()?;
    Ok((rig, sim))
}

/// Rig used by `run`: simulated motion, with GPIO buttons and limit switch
/// when built with the `hardware` feature.
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn build_run_rig(cfg: &Config, clock: Arc<dyn Clock + Send + Sync>) -> eyre::Result<Rig> {
    use puller_hardware::gpio::GpioInput;

    let sim = SimRig::new(sim_cfg(cfg), clock.clone());
    let pins = &cfg.pins;
    let open = GpioInput::open(pins.open_button, cfg.inputs.buttons_active_low)
        .wrap_err("open open_button pin")?;
    let close = GpioInput::open(pins.close_button, cfg.inputs.buttons_active_low)
        .wrap_err("open close_button pin")?;
    let limit = GpioInput::open(pins.limit_switch, cfg.inputs.limit_active_low)
        .wrap_err("open limit_switch pin")?;
    tracing::info!(
        open = pins.open_button,
        close = pins.close_button,
        limit = pins.limit_switch,
        "gpio inputs ready"
    );
    RigBuilder::new()
        .with_load_cell(sim.load_cell())
        .with_stepper(sim.stepper())
        .with_driver(sim.driver())
        .with_inputs(open, close, limit)
        .with_settings(RigSettings::from(cfg))
        .with_clock(clock)
        .build()
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn build_run_rig(cfg: &Config, clock: Arc<dyn Clock + Send + Sync>) -> eyre::Result<Rig> {
    build_sim_rig(cfg, clock).map(|(rig, _sim)| rig)
}
