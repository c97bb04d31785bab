#![cfg_attr(not(test), no_std)]

//! Solenoid PWM controller.
//!
//! A fixed-rate control tick drives a PWM output (static duty or a queued
//! trajectory), samples the current-sense input on every update and publishes
//! the pair into a sample ring. A cooperative host service frames commands
//! from the serial link and streams the ring back as CRC-8 protected packets.
//!
//! The core is hardware independent and runs on the host; the `stm32` feature
//! adds the STM32F405 firmware (board bring-up, USB link, PWM/ADC/flash
//! drivers and the embassy tasks).

pub mod logging;

pub mod drivers;
pub mod settings;
pub mod state;
pub mod tasks;

#[cfg(feature = "stm32")]
pub mod board;
#[cfg(feature = "stm32")]
pub mod usb;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Firmware version reported in the status record.
pub const FIRMWARE_VERSION_MAJOR: u8 = 2;
pub const FIRMWARE_VERSION_MINOR: u8 = 1;
