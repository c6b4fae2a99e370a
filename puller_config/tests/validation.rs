use puller_config::load_toml;
use rstest::rstest;

const PINS: &str = r#"
[pins]
open_button = 15
close_button = 16
limit_switch = 17
step = 21
dir = 20
"#;

fn with_pins(extra: &str) -> String {
    format!("{PINS}\n{extra}")
}

#[test]
fn defaults_match_the_rig() {
    let cfg = load_toml(PINS).expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.motion.speed, 1500);
    assert_eq!(cfg.motion.steps_per_rev, 3200);
    assert_eq!(cfg.motion.active_current_ma, 1000);
    assert_eq!(cfg.motion.idle_current_ma, 400);
    assert!((cfg.break_detect.ratio - 0.8).abs() < f32::EPSILON);
    assert_eq!(cfg.diagnostics.interval_ms, 1000);
    assert!(!cfg.diagnostics.stop_on_fault);
    assert_eq!(cfg.sensor.ema_alpha, None);
    assert!((cfg.homing.retract_mm - 22.0).abs() < f32::EPSILON);
}

#[test]
fn pins_section_is_required() {
    let err = load_toml("[motion]\nspeed = 100\n").expect_err("missing pins");
    assert!(err.to_string().contains("pins"));
}

#[rstest]
#[case("[motion]\nspeed = 0", "motion.speed must be > 0")]
#[case("[motion]\nspeed = 2000\nmax_speed = 1000", "motion.max_speed must be >= motion.speed")]
#[case("[motion]\nidle_current_ma = 1200", "idle_current_ma must be <=")]
#[case("[sensor]\nema_alpha = 0.0", "sensor.ema_alpha must be in (0.0, 1.0]")]
#[case("[sensor]\nema_alpha = 1.5", "sensor.ema_alpha must be in (0.0, 1.0]")]
#[case("[sensor]\nslope = 0.0", "sensor.slope must be finite and non-zero")]
#[case("[break_detect]\nratio = 1.0", "break_detect.ratio must be in (0.0, 1.0)")]
#[case("[diagnostics]\ninterval_ms = 0", "diagnostics.interval_ms must be >= 1")]
#[case("[homing]\nretract_mm = -1.0", "homing.retract_mm must be >= 0")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation must be one of")]
fn rejects_out_of_range_values(#[case] section: &str, #[case] needle: &str) {
    let cfg = load_toml(&with_pins(section)).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn accepts_full_config() {
    let toml = with_pins(
        r#"
[sensor]
slope = 0.0016667
offset = -5.0
ema_alpha = 0.8
read_timeout_ms = 50

[motion]
speed = 1200
max_speed = 8000
acceleration = 40000

[inputs]
button_debounce_ms = 30
limit_debounce_ms = 5

[homing]
retract_mm = 10.0

[diagnostics]
interval_ms = 500
stop_on_fault = true

[logging]
rotation = "daily"
"#,
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.sensor.ema_alpha, Some(0.8));
    assert!(cfg.diagnostics.stop_on_fault);
}
