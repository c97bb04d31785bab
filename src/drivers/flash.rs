use embassy_stm32::flash::{Blocking, Flash};

use crate::settings::{SettingsError, SettingsStore, SETTINGS_RECORD_LEN};

/// Sector 11, the last 128 KiB sector of the STM32F405RG.
const SETTINGS_SECTOR_OFFSET: u32 = 0x000E_0000;
const SETTINGS_SECTOR_SIZE: u32 = 128 * 1024;

/// Settings record kept at the start of the last internal flash sector.
///
/// Erasing stalls instruction fetch for the length of the erase, control tick
/// included, so saving is only done on an explicit host request.
pub struct FlashStore<'d> {
    flash: Flash<'d, Blocking>,
}

impl<'d> FlashStore<'d> {
    pub fn new(flash: Flash<'d, Blocking>) -> Self {
        Self { flash }
    }
}

impl SettingsStore for FlashStore<'_> {
    fn read(&mut self, buf: &mut [u8; SETTINGS_RECORD_LEN]) -> Result<(), SettingsError> {
        self.flash
            .blocking_read(SETTINGS_SECTOR_OFFSET, buf)
            .map_err(|_| SettingsError::Storage)
    }

    fn write(&mut self, record: &[u8; SETTINGS_RECORD_LEN]) -> Result<(), SettingsError> {
        self.flash
            .blocking_erase(SETTINGS_SECTOR_OFFSET, SETTINGS_SECTOR_OFFSET + SETTINGS_SECTOR_SIZE)
            .map_err(|_| SettingsError::Storage)?;
        self.flash
            .blocking_write(SETTINGS_SECTOR_OFFSET, record)
            .map_err(|_| SettingsError::Storage)?;
        crate::log_info!("flash: settings written");
        Ok(())
    }
}
