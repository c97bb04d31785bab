//! Controller configuration record.
//!
//! Loaded once at boot from the settings store (defaults when missing or
//! invalid), mutated field by field by the host commands, persisted only on an
//! explicit save.
//!
//! # Persisted layout
//!
//! ```text
//! 0      pwm_output_pin
//! 1      pwm_sensing_pin
//! 2      current_sensing_pin
//! 3..7   pwm_frequency          u32 BE
//! 7..9   pwm_adc_rate           u16 BE
//! 9..11  current_adc_rate       u16 BE
//! 11     pwm_adc_resolution
//! 12     current_adc_resolution
//! 13     pwm_depth
//! 14..18 magic 0xA5A5A5A5       u32 BE
//! 18     crc8 over bytes 0..18
//! 19     reserved (0), pads the record to a flash word
//! ```

use crate::drivers::checksum::crc8;
use crate::drivers::protocol::STATUS_LEN;
use crate::{FIRMWARE_VERSION_MAJOR, FIRMWARE_VERSION_MINOR};

pub const SETTINGS_MAGIC: u32 = 0xA5A5_A5A5;
pub const SETTINGS_RECORD_LEN: usize = 20;

pub const PWM_FREQ_MIN: u32 = 1_000;
pub const PWM_FREQ_MAX: u32 = 100_000;
pub const ADC_RATE_MIN: u16 = 100;
pub const ADC_RATE_MAX: u16 = 50_000;
pub const ADC_RES_MIN: u8 = 8;
pub const ADC_RES_MAX: u8 = 16;
pub const PWM_DEPTH_MIN: u8 = 2;
pub const PWM_DEPTH_MAX: u8 = 16;

/// GPIO port index used to build pin ids.
pub const PORT_A: u8 = 0;
pub const PORT_B: u8 = 1;
pub const PORT_C: u8 = 2;

/// Pin ids are `port * 16 + pin` (PB0 = 0x10, PC1 = 0x21).
pub const fn pin_id(port: u8, pin: u8) -> u8 {
    port * 16 + pin
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    BadMagic,
    BadCrc,
    OutOfRange,
    /// The backing store failed to read or write.
    Storage,
}

/// Backing medium for the settings record.
pub trait SettingsStore {
    fn read(&mut self, buf: &mut [u8; SETTINGS_RECORD_LEN]) -> Result<(), SettingsError>;
    fn write(&mut self, record: &[u8; SETTINGS_RECORD_LEN]) -> Result<(), SettingsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub pwm_output_pin: u8,
    pub pwm_sensing_pin: u8,
    pub current_sensing_pin: u8,
    pub pwm_frequency: u32,
    pub pwm_adc_rate: u16,
    pub current_adc_rate: u16,
    pub pwm_adc_resolution: u8,
    pub current_adc_resolution: u8,
    pub pwm_depth: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pwm_output_pin: pin_id(PORT_B, 0),
            pwm_sensing_pin: pin_id(PORT_C, 2),
            current_sensing_pin: pin_id(PORT_C, 1),
            pwm_frequency: 10_000,
            pwm_adc_rate: 10_000,
            current_adc_rate: 10_000,
            pwm_adc_resolution: 10,
            current_adc_resolution: 10,
            pwm_depth: 10,
        }
    }
}

impl Settings {
    /// Read and validate the stored record, falling back to defaults.
    pub fn load(store: &mut impl SettingsStore) -> Self {
        let mut record = [0u8; SETTINGS_RECORD_LEN];
        let loaded = store.read(&mut record).and_then(|()| Self::decode(&record));
        match loaded {
            Ok(settings) => {
                crate::log_info!("settings: loaded from store");
                settings
            }
            Err(err) => {
                crate::log_warn!("settings: {:?}, using defaults", err);
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &mut impl SettingsStore) -> Result<(), SettingsError> {
        store.write(&self.encode())
    }

    /// Largest duty the current bit depth can express.
    pub fn max_duty(&self) -> u16 {
        ((1u32 << self.pwm_depth) - 1) as u16
    }

    /// Control tick period derived from the current-sense sampling rate.
    pub fn tick_period_us(&self) -> u32 {
        1_000_000 / u32::from(self.current_adc_rate.max(1))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let in_range = (PWM_FREQ_MIN..=PWM_FREQ_MAX).contains(&self.pwm_frequency)
            && (ADC_RATE_MIN..=ADC_RATE_MAX).contains(&self.pwm_adc_rate)
            && (ADC_RATE_MIN..=ADC_RATE_MAX).contains(&self.current_adc_rate)
            && (ADC_RES_MIN..=ADC_RES_MAX).contains(&self.pwm_adc_resolution)
            && (ADC_RES_MIN..=ADC_RES_MAX).contains(&self.current_adc_resolution)
            && (PWM_DEPTH_MIN..=PWM_DEPTH_MAX).contains(&self.pwm_depth);
        if in_range {
            Ok(())
        } else {
            Err(SettingsError::OutOfRange)
        }
    }

    pub fn encode(&self) -> [u8; SETTINGS_RECORD_LEN] {
        let mut buf = [0u8; SETTINGS_RECORD_LEN];
        buf[0] = self.pwm_output_pin;
        buf[1] = self.pwm_sensing_pin;
        buf[2] = self.current_sensing_pin;
        buf[3..7].copy_from_slice(&self.pwm_frequency.to_be_bytes());
        buf[7..9].copy_from_slice(&self.pwm_adc_rate.to_be_bytes());
        buf[9..11].copy_from_slice(&self.current_adc_rate.to_be_bytes());
        buf[11] = self.pwm_adc_resolution;
        buf[12] = self.current_adc_resolution;
        buf[13] = self.pwm_depth;
        buf[14..18].copy_from_slice(&SETTINGS_MAGIC.to_be_bytes());
        buf[18] = crc8(&buf[..18]);
        buf
    }

    pub fn decode(buf: &[u8; SETTINGS_RECORD_LEN]) -> Result<Self, SettingsError> {
        if u32::from_be_bytes([buf[14], buf[15], buf[16], buf[17]]) != SETTINGS_MAGIC {
            return Err(SettingsError::BadMagic);
        }
        if crc8(&buf[..18]) != buf[18] {
            return Err(SettingsError::BadCrc);
        }

        let settings = Self {
            pwm_output_pin: buf[0],
            pwm_sensing_pin: buf[1],
            current_sensing_pin: buf[2],
            pwm_frequency: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            pwm_adc_rate: u16::from_be_bytes([buf[7], buf[8]]),
            current_adc_rate: u16::from_be_bytes([buf[9], buf[10]]),
            pwm_adc_resolution: buf[11],
            current_adc_resolution: buf[12],
            pwm_depth: buf[13],
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Firmware version followed by every field, multi-byte fields big-endian.
    pub fn status_record(&self) -> [u8; STATUS_LEN] {
        let mut buf = [0u8; STATUS_LEN];
        buf[0] = FIRMWARE_VERSION_MAJOR;
        buf[1] = FIRMWARE_VERSION_MINOR;
        buf[2] = self.pwm_output_pin;
        buf[3] = self.pwm_sensing_pin;
        buf[4] = self.current_sensing_pin;
        buf[5..9].copy_from_slice(&self.pwm_frequency.to_be_bytes());
        buf[9..11].copy_from_slice(&self.pwm_adc_rate.to_be_bytes());
        buf[11..13].copy_from_slice(&self.current_adc_rate.to_be_bytes());
        buf[13] = self.pwm_adc_resolution;
        buf[14] = self.current_adc_resolution;
        buf[15] = self.pwm_depth;
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryStore;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.max_duty(), 1023);
        assert_eq!(s.tick_period_us(), 100);
        assert_eq!(s.pwm_output_pin, 0x10);
    }

    #[test]
    fn save_then_load() {
        let mut store = MemoryStore::new();
        let mut s = Settings::default();
        s.pwm_frequency = 20_000;
        s.pwm_depth = 12;
        s.save(&mut store).unwrap();
        assert_eq!(Settings::load(&mut store), s);
    }

    #[test]
    fn blank_store_falls_back_to_defaults() {
        let mut store = MemoryStore::new();
        assert_eq!(Settings::load(&mut store), Settings::default());
    }

    #[test]
    fn decode_rejects_bad_magic_crc_and_ranges() {
        let good = Settings::default().encode();

        let mut bad_magic = good;
        bad_magic[14] = 0x00;
        assert_eq!(Settings::decode(&bad_magic), Err(SettingsError::BadMagic));

        let mut bad_crc = good;
        bad_crc[3] ^= 0x01;
        assert_eq!(Settings::decode(&bad_crc), Err(SettingsError::BadCrc));

        let mut s = Settings::default();
        s.pwm_depth = 20;
        assert_eq!(Settings::decode(&s.encode()), Err(SettingsError::OutOfRange));
    }

    #[test]
    fn failing_store_falls_back_to_defaults() {
        let mut store = MemoryStore::new();
        let mut s = Settings::default();
        s.pwm_adc_rate = 5_000;
        s.save(&mut store).unwrap();
        store.fail_reads(true);
        assert_eq!(Settings::load(&mut store), Settings::default());
    }

    #[test]
    fn status_record_layout() {
        let record = Settings::default().status_record();
        assert_eq!(
            record,
            [2, 1, 0x10, 0x22, 0x21, 0x00, 0x00, 0x27, 0x10, 0x27, 0x10, 0x27, 0x10, 10, 10, 10]
        );
    }

    #[test]
    fn max_duty_at_full_depth() {
        let mut s = Settings::default();
        s.pwm_depth = 16;
        assert_eq!(s.max_duty(), u16::MAX);
    }
}
