use embassy_stm32::adc::{Adc, Resolution, SampleTime};
use embassy_stm32::peripherals::{ADC1, PC1};

use super::actuator::SenseInput;

/// Current-sense shunt amplifier on ADC1 IN11 (PC1).
///
/// The converter does 8, 10 or 12 bits; wider requests are left-aligned to the
/// requested resolution.
pub struct CurrentSense<'d> {
    adc: Adc<'d, ADC1>,
    pin: PC1,
    pin_id: u8,
    bits: u8,
    hw_bits: u8,
}

impl<'d> CurrentSense<'d> {
    pub fn new(mut adc: Adc<'d, ADC1>, pin: PC1, pin_id: u8) -> Self {
        adc.set_sample_time(SampleTime::Cycles28);
        adc.set_resolution(Resolution::TwelveBit);
        Self {
            adc,
            pin,
            pin_id,
            bits: 12,
            hw_bits: 12,
        }
    }
}

impl SenseInput for CurrentSense<'_> {
    fn read(&mut self) -> u16 {
        let raw = self.adc.read(&mut self.pin);
        if self.bits > self.hw_bits {
            raw << (self.bits - self.hw_bits)
        } else {
            raw
        }
    }

    fn set_resolution(&mut self, bits: u8) {
        let (resolution, hw_bits) = match bits {
            12..=u8::MAX => (Resolution::TwelveBit, 12),
            10..=11 => (Resolution::TenBit, 10),
            _ => (Resolution::EightBit, 8),
        };
        self.adc.set_resolution(resolution);
        self.hw_bits = hw_bits;
        self.bits = bits.max(hw_bits);
    }

    fn select_pin(&mut self, pin: u8) {
        if pin != self.pin_id {
            crate::log_warn!("adc: pin {} is not routable, staying on {}", pin, self.pin_id);
        }
    }
}
