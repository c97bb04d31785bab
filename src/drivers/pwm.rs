use embassy_stm32::peripherals::TIM3;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;

use super::actuator::OutputStage;

/// Solenoid driver output on TIM3 CH3 (PB0).
///
/// Duty values arrive in `depth` bits and are rescaled to the timer's counter
/// range, which changes with the carrier frequency.
pub struct SolenoidPwm<'d> {
    pwm: SimplePwm<'d, TIM3>,
    channel: Channel,
    depth: u8,
    pin: u8,
}

impl<'d> SolenoidPwm<'d> {
    pub fn new(mut pwm: SimplePwm<'d, TIM3>, channel: Channel, pin: u8) -> Self {
        pwm.enable(channel);
        Self {
            pwm,
            channel,
            depth: 10,
            pin,
        }
    }
}

impl OutputStage for SolenoidPwm<'_> {
    fn write_duty(&mut self, duty: u16) {
        let full_scale = (1u32 << self.depth) - 1;
        let top = u32::from(self.pwm.get_max_duty());
        let counts = u32::from(duty).min(full_scale) * top / full_scale;
        self.pwm.set_duty(self.channel, counts as u16);
    }

    fn set_frequency(&mut self, hz: u32) {
        self.pwm.set_frequency(Hertz(hz));
    }

    fn set_depth(&mut self, bits: u8) {
        self.depth = bits.clamp(1, 16);
    }

    fn select_pin(&mut self, pin: u8) {
        // TIM3 CH3 is wired to one pin on this board.
        if pin != self.pin {
            crate::log_warn!("pwm: pin {} is not routable, staying on {}", pin, self.pin);
        }
    }
}
