use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::Config;

use crate::drivers::actuator::BoardPins;
use crate::settings::{pin_id, PORT_B, PORT_C};

/// TIM3 CH3, solenoid driver gate.
pub const PWM_OUTPUT_PIN: u8 = pin_id(PORT_B, 0);
/// PWM feedback divider into ADC2.
pub const PWM_SENSE_PIN: u8 = pin_id(PORT_C, 2);
/// Shunt amplifier into ADC1 IN11.
pub const CURRENT_SENSE_PIN: u8 = pin_id(PORT_C, 1);

/// Pins this board can route; anything else is refused by the host commands.
pub const PINS: BoardPins = BoardPins {
    output: &[PWM_OUTPUT_PIN],
    pwm_sense: &[PWM_SENSE_PIN],
    current_sense: &[CURRENT_SENSE_PIN],
};

pub struct Board {
    pub p: embassy_stm32::Peripherals,
}

impl Board {
    /// 8 MHz HSE -> 168 MHz SYSCLK, 48 MHz for USB.
    ///
    /// TIM3 runs from APB1 x2 (84 MHz), the fastest timer clock on that bus.
    /// At the 100 kHz carrier ceiling this leaves an 840-count period, so
    /// `SolenoidPwm` rescales duty onto the counter and full scale stays
    /// reachable at every allowed frequency.
    pub fn init() -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2),
            divq: Some(PllQDiv::DIV7),
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        let p = embassy_stm32::init(config);
        crate::log_info!("board: clocks up, 168 MHz");

        Self { p }
    }
}
