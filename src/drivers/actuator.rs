//! Peripheral interfaces owned by the control tick.
//!
//! Platform implementations: `drivers::pwm` / `drivers::adc` on the STM32
//! board, `mock` on the host.
//!
//! # Safety Invariants
//!
//! - One owner per peripheral: the control tick.
//! - Reconfiguration arrives through `SharedState::request` and is applied by
//!   the tick between two samples, never concurrently with a duty write.

/// PWM output driving the solenoid.
pub trait OutputStage {
    /// Write a duty in the configured bit depth (`0..=(1 << depth) - 1`).
    fn write_duty(&mut self, duty: u16);

    /// Change the PWM carrier frequency (Hz).
    fn set_frequency(&mut self, hz: u32);

    /// Change the bit depth `write_duty` values are expressed in.
    fn set_depth(&mut self, bits: u8);

    /// Route the output to another pin id.
    fn select_pin(&mut self, pin: u8);
}

/// Current-sense analog input.
pub trait SenseInput {
    /// One conversion, in the configured resolution.
    fn read(&mut self) -> u16;

    fn set_resolution(&mut self, bits: u8);

    fn select_pin(&mut self, pin: u8);
}

/// Pin ids the board can actually route, checked before a pin change is
/// accepted from the host.
#[derive(Debug, Clone, Copy)]
pub struct BoardPins {
    pub output: &'static [u8],
    pub pwm_sense: &'static [u8],
    pub current_sense: &'static [u8],
}

impl BoardPins {
    pub fn output_ok(&self, pin: u8) -> bool {
        self.output.contains(&pin)
    }

    pub fn pwm_sense_ok(&self, pin: u8) -> bool {
        self.pwm_sense.contains(&pin)
    }

    pub fn current_sense_ok(&self, pin: u8) -> bool {
        self.current_sense.contains(&pin)
    }
}
