//! Output drivers, input lines, hardware initialisation.

pub mod button;
pub mod buzzer;
pub mod hw_init;
pub mod led_patterns;
pub mod status_led;
pub mod watchdog;
