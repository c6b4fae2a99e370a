//! Debounced digital inputs: the two operator buttons and the limit switch.

use puller_traits::DigitalInput;

use crate::config::InputsCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Pressed pulls the line low (pull-up wiring).
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    pub fn from_active_low(active_low: bool) -> Self {
        if active_low {
            Polarity::ActiveLow
        } else {
            Polarity::ActiveHigh
        }
    }

    #[inline]
    fn pressed(self, high: bool) -> bool {
        match self {
            Polarity::ActiveLow => !high,
            Polarity::ActiveHigh => high,
        }
    }
}

/// One input with a time-window debounce.
///
/// A raw level must stay unchanged for `window_ms` before the stable state
/// follows it; shorter pulses are ignored. The first `update` adopts the raw
/// level without reporting an edge.
pub struct Debounced<P: DigitalInput> {
    pin: P,
    polarity: Polarity,
    window_ms: u64,
    raw: Option<bool>,
    raw_since_ms: u64,
    stable: bool,
    rose: bool,
    fell: bool,
}

impl<P: DigitalInput> Debounced<P> {
    pub fn new(pin: P, polarity: Polarity, window_ms: u64) -> Self {
        Self {
            pin,
            polarity,
            window_ms,
            raw: None,
            raw_since_ms: 0,
            stable: false,
            rose: false,
            fell: false,
        }
    }

    /// Sample the pin. Must run once per cycle before `pressed` is read.
    pub fn update(&mut self, now_ms: u64) {
        self.rose = false;
        self.fell = false;
        let level = self.polarity.pressed(self.pin.is_high());

        let Some(prev) = self.raw else {
            self.raw = Some(level);
            self.raw_since_ms = now_ms;
            self.stable = level;
            return;
        };
        if level != prev {
            self.raw = Some(level);
            self.raw_since_ms = now_ms;
        }
        if level != self.stable && now_ms.saturating_sub(self.raw_since_ms) >= self.window_ms {
            self.stable = level;
            self.rose = level;
            self.fell = !level;
        }
    }

    pub fn pressed(&self) -> bool {
        self.stable
    }

    /// Became pressed on the last update.
    pub fn rose(&self) -> bool {
        self.rose
    }

    /// Became released on the last update.
    pub fn fell(&self) -> bool {
        self.fell
    }
}

/// Debounced state of all rig inputs for one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputState {
    pub open_pressed: bool,
    pub close_pressed: bool,
    pub limit_pressed: bool,
}

pub struct RigInputs {
    open: Debounced<Box<dyn DigitalInput>>,
    close: Debounced<Box<dyn DigitalInput>>,
    limit: Debounced<Box<dyn DigitalInput>>,
}

impl RigInputs {
    pub fn new(
        open: Box<dyn DigitalInput>,
        close: Box<dyn DigitalInput>,
        limit: Box<dyn DigitalInput>,
        cfg: &InputsCfg,
    ) -> Self {
        let buttons = Polarity::from_active_low(cfg.buttons_active_low);
        Self {
            open: Debounced::new(open, buttons, cfg.button_debounce_ms),
            close: Debounced::new(close, buttons, cfg.button_debounce_ms),
            limit: Debounced::new(
                limit,
                Polarity::from_active_low(cfg.limit_active_low),
                cfg.limit_debounce_ms,
            ),
        }
    }

    pub fn update(&mut self, now_ms: u64) {
        self.open.update(now_ms);
        self.close.update(now_ms);
        self.limit.update(now_ms);
        if self.limit.rose() {
            tracing::debug!(now_ms, "limit switch pressed");
        }
    }

    pub fn snapshot(&self) -> InputState {
        InputState {
            open_pressed: self.open.pressed(),
            close_pressed: self.close.pressed(),
            limit_pressed: self.limit.pressed(),
        }
    }
}

impl std::fmt::Debug for RigInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RigInputs").field(&self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct Line(Rc<Cell<bool>>);

    impl DigitalInput for Line {
        fn is_high(&mut self) -> bool {
            self.0.get()
        }
    }

    #[test]
    fn short_pulse_is_ignored() {
        let level = Rc::new(Cell::new(true));
        let mut d = Debounced::new(Line(level.clone()), Polarity::ActiveLow, 50);
        d.update(0);
        assert!(!d.pressed());
        level.set(false);
        d.update(10);
        d.update(40);
        level.set(true);
        d.update(45);
        d.update(200);
        assert!(!d.pressed());
    }

    #[test]
    fn stable_press_is_adopted_after_window() {
        let level = Rc::new(Cell::new(true));
        let mut d = Debounced::new(Line(level.clone()), Polarity::ActiveLow, 50);
        d.update(0);
        level.set(false);
        d.update(10);
        d.update(59);
        assert!(!d.pressed());
        d.update(60);
        assert!(d.pressed());
        assert!(d.rose());
        d.update(61);
        assert!(!d.rose());
    }

    #[test]
    fn active_high_polarity() {
        let level = Rc::new(Cell::new(true));
        let mut d = Debounced::new(Line(level), Polarity::ActiveHigh, 0);
        d.update(0);
        assert!(d.pressed());
    }
}
