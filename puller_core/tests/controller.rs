use std::collections::VecDeque;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use puller_core::{
    AbortReason, Completion, ForceCalibration, HomingPhase, Rig, RigBuilder, RigMode, RigReport, RigSettings, RigStatus,
    RecordingOutput, RunOptions, StopReason,
};
use puller_hardware::{SimButton, SimDriver, SimRig, SimRigCfg};
use puller_traits::{DriverFaultFlags, FaultFlag, LoadCell, ManualClock};

struct Bench {
    sim: SimRig,
    clock: ManualClock,
    driver: SimDriver,
    open: SimButton,
    close: SimButton,
    rig: Rig,
}

fn bench(sim_cfg: SimRigCfg, settings: RigSettings) -> Bench {
    let clock = ManualClock::new();
    let sim = SimRig::new(sim_cfg, Arc::new(clock.clone()));
    let driver = sim.driver();
    let open = sim.button();
    let close = sim.button();
    let mut rig = RigBuilder::new()
        .with_load_cell(sim.load_cell())
        .with_stepper(sim.stepper())
        .with_driver(driver.clone())
        .with_inputs(open.clone(), close.clone(), sim.limit_switch())
        .with_settings(settings)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("rig build");
    rig.startup(&AtomicBool::new(false)).expect("startup");
    Bench {
        sim,
        clock,
        driver,
        open,
        close,
        rig,
    }
}

fn tick(clock: &ManualClock) {
    clock.advance(Duration::from_millis(1));
}

fn lines(cmds: &[&str]) -> VecDeque<String> {
    cmds.iter().map(|s| s.to_string()).collect()
}

fn run_script(b: &mut Bench, cmds: &[&str], max_cycles: u64) -> RecordingOutput {
    let mut input = lines(cmds);
    let mut out = RecordingOutput::new();
    b.rig
        .run(
            &mut input,
            &mut out,
            &AtomicBool::new(false),
            RunOptions {
                max_cycles: Some(max_cycles),
                until_idle: true,
            },
        )
        .expect("run");
    out
}

#[test]
fn move_to_position_ten_reaches_sixteen_thousand_steps() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    let out = run_script(&mut b, &["move_to_position10"], 20_000);

    assert_eq!(
        out.completions(),
        vec![Completion::PositionReached { steps: 16_000 }]
    );
    assert_eq!(b.rig.actuator().current_position(), 16_000);
    assert_eq!(b.sim.carriage_steps(), 16_000);
    assert_eq!(b.rig.mode(), RigMode::Idle);
    // hold at startup, run for the move, hold again once there
    assert_eq!(b.driver.current_writes(), vec![400, 1000, 400]);
}

#[test]
fn unknown_command_reports_once_and_changes_nothing() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    let out = run_script(&mut b, &["fly"], 100);
    assert_eq!(out.invalid_count(), 1);
    assert_eq!(out.reports.len(), 1);
    assert_eq!(out.reports[0].to_string(), "Invalid command");
    assert_eq!(b.rig.mode(), RigMode::Idle);
    assert_eq!(b.sim.carriage_steps(), 0);
}

#[test]
fn blank_lines_are_ignored() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    let out = run_script(&mut b, &["", "   ", "\r"], 100);
    assert!(out.reports.is_empty());
}

#[test]
fn homing_zeroes_the_position_after_retracting() {
    let sim_cfg = SimRigCfg {
        limit_mm: 1.0,
        ..SimRigCfg::default()
    };
    let mut settings = RigSettings::default();
    settings.rig.retract_mm = 0.5;
    let mut b = bench(sim_cfg, settings);
    let out = run_script(&mut b, &["home"], 20_000);

    assert_eq!(out.completions(), vec![Completion::Homed]);
    assert_eq!(b.rig.actuator().current_position(), 0);
    // Logical zero sits half a millimetre back from where the switch closed.
    let carriage = b.sim.carriage_steps();
    assert!((800..900).contains(&carriage), "carriage at {carriage}");
}

#[test]
fn open_until_break_detects_specimen_failure() {
    let mut settings = RigSettings::default();
    settings.rig.speed = 3000;
    let mut b = bench(SimRigCfg::default(), settings);
    b.sim.place_carriage_mm(3.0);
    let out = run_script(&mut b, &["open_until_break"], 20_000);

    let completions = out.completions();
    assert_eq!(completions.len(), 1, "{completions:?}");
    match completions[0] {
        Completion::BreakDetected { previous, current } => {
            assert!(previous > 19.0, "previous={previous}");
            assert!(current < previous * 0.8);
        }
        other => panic!("expected break, got {other:?}"),
    }
    assert_eq!(b.rig.mode(), RigMode::Idle);
}

#[test]
fn move_to_force_stops_once_target_is_reached() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    let out = run_script(&mut b, &["move_to_force10"], 20_000);
    match out.completions().as_slice() {
        [Completion::ForceReached { force }] => assert!(*force >= 10.0),
        other => panic!("unexpected completions {other:?}"),
    }
    let last = out.telemetry.last().expect("telemetry");
    assert!(last.travel_mm >= 3.99 && last.travel_mm < 4.2, "{last:?}");
}

#[test]
fn opening_aborts_at_end_of_travel() {
    let sim_cfg = SimRigCfg {
        limit_mm: 1.0,
        break_at_mm: None,
        ..SimRigCfg::default()
    };
    let mut b = bench(sim_cfg, RigSettings::default());
    let out = run_script(&mut b, &["open"], 5_000);
    assert!(
        out.reports
            .contains(&RigReport::Aborted(AbortReason::EndOfTravel))
    );
    assert_eq!(b.rig.mode(), RigMode::Idle);
}

#[test]
fn absolute_move_past_the_limit_aborts_at_end_of_travel() {
    let sim_cfg = SimRigCfg {
        limit_mm: 1.0,
        break_at_mm: None,
        ..SimRigCfg::default()
    };
    let mut b = bench(sim_cfg, RigSettings::default());
    let out = run_script(&mut b, &["move_to_position10"], 20_000);

    assert!(
        out.reports
            .contains(&RigReport::Aborted(AbortReason::EndOfTravel)),
        "{:?}",
        out.reports
    );
    assert!(out.completions().is_empty());
    assert_eq!(b.rig.mode(), RigMode::Idle);
    // Switch closes at 1600 steps; only the debounce window of travel is allowed past it.
    let carriage = b.sim.carriage_steps();
    assert!((1600..1700).contains(&carriage), "carriage at {carriage}");
}

#[test]
fn absolute_move_away_from_a_closed_limit_is_allowed() {
    let sim_cfg = SimRigCfg {
        limit_mm: 1.0,
        break_at_mm: None,
        ..SimRigCfg::default()
    };
    let mut b = bench(sim_cfg, RigSettings::default());
    b.sim.place_carriage_mm(1.5);
    let out = run_script(&mut b, &["move_to_position-2"], 20_000);

    assert_eq!(
        out.completions(),
        vec![Completion::PositionReached { steps: -3200 }]
    );
}

fn cycles(rig: &mut Rig, input: &mut VecDeque<String>, out: &mut RecordingOutput, clock: &ManualClock, n: usize) {
    for _ in 0..n {
        rig.cycle(input, out).unwrap();
        tick(clock);
    }
}

#[test]
fn homing_ignores_a_limit_glitch_shorter_than_the_debounce_window() {
    let clock = ManualClock::new();
    let sim = SimRig::new(SimRigCfg::default(), Arc::new(clock.clone()));
    // Scripted limit line: active-low like the real switch.
    let limit = sim.button();
    let mut rig = RigBuilder::new()
        .with_load_cell(sim.load_cell())
        .with_stepper(sim.stepper())
        .with_driver(sim.driver())
        .with_inputs(sim.button(), sim.button(), limit.clone())
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("rig build");
    rig.startup(&AtomicBool::new(false)).expect("startup");
    assert_eq!(rig.settings().inputs.limit_debounce_ms, 5);

    let mut input = lines(&["home"]);
    let mut out = RecordingOutput::new();
    cycles(&mut rig, &mut input, &mut out, &clock, 20);
    assert_eq!(rig.mode(), RigMode::Homing(HomingPhase::Seeking));
    let before = rig.actuator().current_position();
    assert!(before > 0);

    // 2 ms bounce: never stable for the 5 ms window.
    limit.press();
    cycles(&mut rig, &mut input, &mut out, &clock, 2);
    limit.release();
    cycles(&mut rig, &mut input, &mut out, &clock, 20);

    assert_eq!(rig.mode(), RigMode::Homing(HomingPhase::Seeking));
    assert!(!rig.inputs().limit_pressed);
    assert!(
        rig.actuator().current_position() > before,
        "position was re-zeroed: {}",
        rig.actuator().current_position()
    );

    // A held press is adopted and starts the retract.
    limit.press();
    cycles(&mut rig, &mut input, &mut out, &clock, 10);
    assert_eq!(rig.mode(), RigMode::Homing(HomingPhase::Retracting));
    assert!(rig.actuator().remaining_steps() < 0);
}

#[test]
fn stop_preempts_open() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    let mut input = lines(&["open"]);
    let mut out = RecordingOutput::new();
    for _ in 0..100 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    assert_eq!(b.rig.mode(), RigMode::Opening);
    let moved = b.sim.carriage_steps();
    assert!(moved > 0);

    input.push_back("stop".into());
    input.push_back("stop".into());
    for _ in 0..10 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    assert_eq!(b.rig.mode(), RigMode::Idle);
    assert_eq!(b.rig.actuator().velocity(), 0);
    let stopped = b.sim.carriage_steps();
    for _ in 0..10 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    assert_eq!(b.sim.carriage_steps(), stopped);
}

#[test]
fn open_button_runs_only_while_held_after_debounce() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    let mut input = VecDeque::new();
    let mut out = RecordingOutput::new();
    for _ in 0..5 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }

    b.open.press();
    for _ in 0..40 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    assert_eq!(b.rig.mode(), RigMode::Idle, "debounce window not yet elapsed");
    for _ in 0..20 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    assert_eq!(b.rig.mode(), RigMode::Opening);

    b.open.release();
    for _ in 0..60 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    assert_eq!(b.rig.mode(), RigMode::Idle);

    b.close.press();
    for _ in 0..60 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    assert_eq!(b.rig.mode(), RigMode::Closing);
}

#[test]
fn driver_faults_are_reported_once_per_interval() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    b.driver.set_faults(DriverFaultFlags {
        open_load_a: true,
        ..Default::default()
    });
    let mut input = VecDeque::new();
    let mut out = RecordingOutput::new();
    for _ in 0..2500 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    let faults = out
        .reports
        .iter()
        .filter(|r| **r == RigReport::Fault(FaultFlag::OpenLoadA))
        .count();
    assert_eq!(faults, 2);
    assert_eq!(b.driver.fault_reads(), 2);
}

#[test]
fn faults_do_not_stop_motion_by_default() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    b.driver.set_faults(DriverFaultFlags {
        overtemp: true,
        ..Default::default()
    });
    let mut input = lines(&["close"]);
    let mut out = RecordingOutput::new();
    for _ in 0..1500 {
        b.rig.cycle(&mut input, &mut out).unwrap();
        tick(&b.clock);
    }
    assert!(out.reports.contains(&RigReport::Fault(FaultFlag::Overtemp)));
    assert_eq!(b.rig.mode(), RigMode::Closing);
}

#[test]
fn critical_fault_stops_motion_when_escalation_is_on() {
    let mut settings = RigSettings::default();
    settings.diagnostics.stop_on_fault = true;
    let mut b = bench(SimRigCfg::default(), settings);
    b.driver.set_faults(DriverFaultFlags {
        short_to_ground_a: true,
        ..Default::default()
    });
    let mut input = lines(&["close"]);
    let mut out = RecordingOutput::new();
    let mut aborted = None;
    for _ in 0..1500 {
        if let RigStatus::Aborted(r) = b.rig.cycle(&mut input, &mut out).unwrap() {
            aborted = Some(r);
            break;
        }
        tick(&b.clock);
    }
    assert_eq!(
        aborted,
        Some(AbortReason::DriverFault(FaultFlag::ShortToGroundA))
    );
    assert_eq!(b.rig.mode(), RigMode::Idle);
}

#[test]
fn telemetry_starts_at_zero() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    let mut input = VecDeque::new();
    let mut out = RecordingOutput::new();
    b.rig.cycle(&mut input, &mut out).unwrap();
    assert_eq!(out.telemetry.len(), 1);
    let t = out.telemetry[0];
    assert_eq!(t.timestamp_ms, 0);
    assert_eq!(t.travel_mm, 0.0);
    assert!(t.force.abs() < 0.01, "{t:?}");
}

#[test]
fn run_stops_on_shutdown_and_leaves_motor_idle() {
    let mut b = bench(SimRigCfg::default(), RigSettings::default());
    let mut input = lines(&["open"]);
    let mut out = RecordingOutput::new();
    b.rig
        .run(&mut input, &mut out, &AtomicBool::new(false), RunOptions {
            max_cycles: Some(50),
            until_idle: false,
        })
        .unwrap();
    let summary = b
        .rig
        .run(&mut input, &mut out, &AtomicBool::new(true), RunOptions::default())
        .unwrap();
    assert_eq!(summary.stop, StopReason::Shutdown);
    assert_eq!(summary.cycles, 0);
    assert_eq!(b.rig.mode(), RigMode::Idle);
    assert_eq!(b.driver.current_ma(), 400);
}

// ── Sensor failures ──────────────────────────────────────────────────────────

struct FlakyCell {
    fail: Arc<AtomicBool>,
}

impl LoadCell for FlakyCell {
    fn begin(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
    fn calibrate_internal(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
    fn read(&mut self, _timeout: Duration) -> Result<i32, Box<dyn Error + Send + Sync>> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            Err("adc timeout".into())
        } else {
            Ok(3000)
        }
    }
}

#[test]
fn sensor_failure_streak_aborts_motion() {
    let clock = ManualClock::new();
    let sim = SimRig::new(SimRigCfg::default(), Arc::new(clock.clone()));
    let fail = Arc::new(AtomicBool::new(false));
    let mut settings = RigSettings::default();
    settings.sensor.max_consecutive_failures = 3;
    let mut rig = RigBuilder::new()
        .with_load_cell(FlakyCell { fail: fail.clone() })
        .with_stepper(sim.stepper())
        .with_driver(sim.driver())
        .with_inputs(sim.button(), sim.button(), sim.limit_switch())
        .with_settings(settings)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    rig.startup(&AtomicBool::new(false)).unwrap();

    let mut input = lines(&["open"]);
    let mut out = RecordingOutput::new();
    rig.cycle(&mut input, &mut out).unwrap();
    assert_eq!(out.telemetry.len(), 1);

    fail.store(true, std::sync::atomic::Ordering::Relaxed);
    let statuses: Vec<RigStatus> = (0..3)
        .map(|_| rig.cycle(&mut input, &mut out).unwrap())
        .collect();
    assert_eq!(
        statuses,
        vec![
            RigStatus::Running,
            RigStatus::Running,
            RigStatus::Aborted(AbortReason::SensorFailure)
        ]
    );
    assert_eq!(out.telemetry.len(), 1, "no telemetry without a sample");
    assert_eq!(rig.mode(), RigMode::Idle);
}

// ── Startup ──────────────────────────────────────────────────────────────────

#[test]
fn startup_retries_until_the_load_cell_answers() {
    let clock = ManualClock::new();
    let sim = SimRig::new(SimRigCfg::default(), Arc::new(clock.clone()));
    let mut rig = RigBuilder::new()
        .with_load_cell(sim.load_cell().with_begin_failures(3).with_calibration_failures(2))
        .with_stepper(sim.stepper())
        .with_driver(sim.driver())
        .with_inputs(sim.button(), sim.button(), sim.limit_switch())
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    rig.startup(&AtomicBool::new(false)).unwrap();
    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert_eq!(rig.now_ms(), 0);
}

#[test]
fn startup_can_be_cancelled() {
    let clock = ManualClock::new();
    let sim = SimRig::new(SimRigCfg::default(), Arc::new(clock.clone()));
    let mut rig = RigBuilder::new()
        .with_load_cell(sim.load_cell().with_begin_failures(u32::MAX))
        .with_stepper(sim.stepper())
        .with_driver(sim.driver())
        .with_inputs(sim.button(), sim.button(), sim.limit_switch())
        .with_clock(Arc::new(clock))
        .build()
        .unwrap();
    let err = rig.startup(&AtomicBool::new(true)).unwrap_err();
    assert!(
        err.chain().any(|c| c.to_string().contains("cancelled")),
        "{err:?}"
    );
}

#[test]
fn builder_calibration_overrides_settings() {
    let clock = ManualClock::new();
    let sim = SimRig::new(SimRigCfg::default(), Arc::new(clock.clone()));
    let mut rig = RigBuilder::new()
        .with_load_cell(sim.load_cell())
        .with_stepper(sim.stepper())
        .with_driver(sim.driver())
        .with_inputs(sim.button(), sim.button(), sim.limit_switch())
        .with_calibration(ForceCalibration {
            slope: 1.0 / 600.0,
            offset: -4.0,
        })
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("rig build");
    rig.startup(&AtomicBool::new(false)).expect("startup");

    // Unloaded specimen reads 3000 counts; the shifted offset reads 1 N.
    let mut out = RecordingOutput::new();
    rig.cycle(&mut VecDeque::<String>::new(), &mut out).expect("cycle");
    let force = rig.last_force().expect("sampled");
    assert!((force - 1.0).abs() < 1e-3, "force {force}");
    assert!((rig.settings().sensor.offset + 4.0).abs() < f32::EPSILON);
    rig.stop().expect("stop");
    assert_eq!(rig.mode(), RigMode::Idle);
}
