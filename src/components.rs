//! Status LEDs mirroring the result of each run
use embedded_hal::digital::{OutputPin, PinState};
use log::warn;

/// All states for LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunStatus {
    /// None illuminated
    Idle,
    /// Yellow: a run is in progress
    Busy,
    /// Green: last run passed
    Pass,
    /// Red: last run failed
    Fail,
}

/// Something that can display a [`RunStatus`]
pub trait Indicator {
    /// Show `status`, replacing the previous one
    fn show(&mut self, status: RunStatus);
}

/// Controls the status LEDs on separate pins
pub struct StatusLeds<B, P, F> {
    /// Current LED state
    pub state: RunStatus,
    busy_led: B,
    pass_led: P,
    fail_led: F,
}

impl<B: OutputPin, P: OutputPin, F: OutputPin> StatusLeds<B, P, F> {
    /// Take ownership of the three (already configured) output pins, all switched off
    pub fn new(busy_led: B, pass_led: P, fail_led: F) -> Self {
        let mut leds = Self {
            state: RunStatus::Busy,
            busy_led,
            pass_led,
            fail_led,
        };
        leds.show(RunStatus::Idle);
        leds
    }

    /// Release the pins
    pub fn free(self) -> (B, P, F) {
        (self.busy_led, self.pass_led, self.fail_led)
    }
}

impl<B: OutputPin, P: OutputPin, F: OutputPin> Indicator for StatusLeds<B, P, F> {
    fn show(&mut self, status: RunStatus) {
        let lit = |on: bool| PinState::from(on);
        let results = [
            self.busy_led
                .set_state(lit(status == RunStatus::Busy))
                .is_ok(),
            self.pass_led
                .set_state(lit(status == RunStatus::Pass))
                .is_ok(),
            self.fail_led
                .set_state(lit(status == RunStatus::Fail))
                .is_ok(),
        ];
        if results.contains(&false) {
            warn!("Unable to drive every status LED");
        }
        self.state = status;
    }
}
