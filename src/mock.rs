//! Mock peripherals for host tests.
//!
//! Available in test builds and with the `mock` feature.

use heapless::Vec;

use crate::drivers::actuator::{BoardPins, OutputStage, SenseInput};
use crate::settings::{pin_id, SettingsError, SettingsStore, PORT_A, PORT_B, PORT_C, SETTINGS_RECORD_LEN};

/// Duty writes kept by `MockOutput`; later writes only update `last_duty`.
pub const MOCK_HISTORY_LEN: usize = 1024;

/// Pins the mock board routes: the default ones plus one spare of each kind.
pub const MOCK_PINS: BoardPins = BoardPins {
    output: &[pin_id(PORT_B, 0), pin_id(PORT_B, 1)],
    pwm_sense: &[pin_id(PORT_C, 2), pin_id(PORT_C, 3)],
    current_sense: &[pin_id(PORT_C, 1), pin_id(PORT_A, 4)],
};

/// Records every duty write and reconfiguration.
#[derive(Debug, Default)]
pub struct MockOutput {
    pub history: Vec<u16, MOCK_HISTORY_LEN>,
    pub last_duty: Option<u16>,
    pub frequency: u32,
    pub depth: u8,
    pub pin: u8,
}

impl MockOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputStage for MockOutput {
    fn write_duty(&mut self, duty: u16) {
        let _ = self.history.push(duty);
        self.last_duty = Some(duty);
    }

    fn set_frequency(&mut self, hz: u32) {
        self.frequency = hz;
    }

    fn set_depth(&mut self, bits: u8) {
        self.depth = bits;
    }

    fn select_pin(&mut self, pin: u8) {
        self.pin = pin;
    }
}

/// Returns `value`, then advances it by `step` (wrapping) on every read.
#[derive(Debug, Default)]
pub struct MockSense {
    pub value: u16,
    pub step: u16,
    pub reads: u32,
    pub resolution: u8,
    pub pin: u8,
}

impl MockSense {
    pub fn new(value: u16, step: u16) -> Self {
        Self {
            value,
            step,
            ..Self::default()
        }
    }
}

impl SenseInput for MockSense {
    fn read(&mut self) -> u16 {
        let v = self.value;
        self.value = self.value.wrapping_add(self.step);
        self.reads += 1;
        v
    }

    fn set_resolution(&mut self, bits: u8) {
        self.resolution = bits;
    }

    fn select_pin(&mut self, pin: u8) {
        self.pin = pin;
    }
}

/// Settings store held in RAM.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub record: Option<[u8; SETTINGS_RECORD_LEN]>,
    pub writes: u32,
    fail_reads: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }
}

impl SettingsStore for MemoryStore {
    fn read(&mut self, buf: &mut [u8; SETTINGS_RECORD_LEN]) -> Result<(), SettingsError> {
        if self.fail_reads {
            return Err(SettingsError::Storage);
        }
        // Erased flash reads back as 0xFF.
        *buf = self.record.unwrap_or([0xFF; SETTINGS_RECORD_LEN]);
        Ok(())
    }

    fn write(&mut self, record: &[u8; SETTINGS_RECORD_LEN]) -> Result<(), SettingsError> {
        self.record = Some(*record);
        self.writes += 1;
        Ok(())
    }
}
