use puller_traits::DigitalInput;
use rppal::gpio::{Gpio, InputPin};
use tracing::debug;

use crate::error::{HwError, Result};

/// Raw GPIO input (button or limit switch) on a Raspberry Pi header pin.
pub struct GpioInput {
    pin: InputPin,
}

impl GpioInput {
    /// Open `bcm_pin` as an input. `pull_up` enables the internal pull-up
    /// resistor, which active-low switches to ground rely on.
    pub fn open(bcm_pin: u8, pull_up: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let raw = gpio
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(format!("pin {bcm_pin}: {e}")))?;
        let pin = if pull_up {
            raw.into_input_pullup()
        } else {
            raw.into_input()
        };
        debug!(bcm_pin, pull_up, "gpio input opened");
        Ok(Self { pin })
    }
}

impl DigitalInput for GpioInput {
    fn is_high(&mut self) -> bool {
        self.pin.is_high()
    }
}
