pub mod actuator;
pub mod checksum;
pub mod frame;
pub mod protocol;
pub mod stream;
pub mod trajectory;

#[cfg(feature = "stm32")]
pub mod adc;
#[cfg(feature = "stm32")]
pub mod flash;
#[cfg(feature = "stm32")]
pub mod pwm;
