//! Capability traits for the devices the rig controller drives.
//!
//! Every external collaborator (load-cell ADC, stepper pulse generator,
//! motor-driver chip, digital inputs, command transport) is reached through
//! one of these traits so the core never depends on a concrete backend.

pub mod clock;
pub mod faults;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use faults::{DriverFaultFlags, FaultFlag};

use std::time::Duration;

/// Load-cell ADC (e.g. NAU7802) delivering raw signed counts.
pub trait LoadCell {
    /// Probe and configure the device. Fails when the device is absent.
    fn begin(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Run the device's internal offset calibration.
    fn calibrate_internal(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Block until a conversion is ready (bounded by `timeout`) and return it.
    fn read(&mut self, timeout: Duration) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Step/direction motion generator with an internal trapezoidal profile.
///
/// Mirrors the cooperative "pump" model: nothing moves unless `run` or
/// `run_speed` is called.
pub trait Stepper {
    /// Constant speed used by `run_speed`, in steps per second (signed).
    fn set_speed(&mut self, steps_per_sec: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Absolute target used by `run`.
    fn move_to(&mut self, target: i64) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Signed steps between the current position and the `move_to` target.
    fn distance_to_go(&self) -> i64;

    /// Advance the accelerated move by at most one step. Returns true while still moving.
    fn run(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    /// Advance the constant-speed move by at most one step. Returns true if a step was taken.
    fn run_speed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    fn current_position(&self) -> i64;

    /// Speed ceiling for `run`, steps per second.
    fn set_max_speed(&mut self, steps_per_sec: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Ramp rate for `run`, steps per second squared.
    fn set_acceleration(&mut self, steps_per_sec2: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Redefine the current position without moving (also clears any pending target).
    fn set_current_position(&mut self, position: i64);
}

/// Motor-driver chip (e.g. TMC5160) reachable over SPI.
pub trait MotorDriver {
    fn set_rms_current(&mut self, milliamps: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn read_faults(&mut self) -> Result<DriverFaultFlags, Box<dyn std::error::Error + Send + Sync>>;
}

/// A raw digital input line. Debouncing and polarity live in the core.
pub trait DigitalInput {
    fn is_high(&mut self) -> bool;
}

/// Line-oriented command transport. Never blocks.
pub trait LineSource {
    /// Next complete line if one has arrived, without the terminator.
    fn poll_line(&mut self) -> Option<String>;

    /// True once no further lines can arrive.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<T: LoadCell + ?Sized> LoadCell for Box<T> {
    fn begin(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).begin()
    }
    fn calibrate_internal(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).calibrate_internal()
    }
    fn read(&mut self, timeout: Duration) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(timeout)
    }
}

impl<T: Stepper + ?Sized> Stepper for Box<T> {
    fn set_speed(&mut self, steps_per_sec: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_speed(steps_per_sec)
    }
    fn move_to(&mut self, target: i64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).move_to(target)
    }
    fn distance_to_go(&self) -> i64 {
        (**self).distance_to_go()
    }
    fn run(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).run()
    }
    fn run_speed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).run_speed()
    }
    fn current_position(&self) -> i64 {
        (**self).current_position()
    }
    fn set_max_speed(&mut self, steps_per_sec: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_max_speed(steps_per_sec)
    }
    fn set_acceleration(&mut self, steps_per_sec2: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_acceleration(steps_per_sec2)
    }
    fn set_current_position(&mut self, position: i64) {
        (**self).set_current_position(position);
    }
}

impl<T: MotorDriver + ?Sized> MotorDriver for Box<T> {
    fn set_rms_current(&mut self, milliamps: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_rms_current(milliamps)
    }
    fn read_faults(&mut self) -> Result<DriverFaultFlags, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_faults()
    }
}

impl<T: DigitalInput + ?Sized> DigitalInput for Box<T> {
    fn is_high(&mut self) -> bool {
        (**self).is_high()
    }
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn poll_line(&mut self) -> Option<String> {
        (**self).poll_line()
    }
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Lines queued up front; handy for scripted runs.
impl LineSource for std::collections::VecDeque<String> {
    fn poll_line(&mut self) -> Option<String> {
        self.pop_front()
    }

    fn is_closed(&self) -> bool {
        self.is_empty()
    }
}
