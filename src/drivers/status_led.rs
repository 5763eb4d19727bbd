//! RGB mode LED driver.
//!
//! Three LEDC PWM channels drive a common-cathode RGB LED.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives three LEDC PWM channels via hw_init.
//! On host/test: tracks state in-memory only.

use crate::drivers::hw_init;
use crate::pins;

pub struct StatusLed {
    current: (u8, u8, u8),
}

impl StatusLed {
    pub fn new() -> Self {
        Self { current: (0, 0, 0) }
    }

    /// Write only when the colour changes.
    pub fn set_colour(&mut self, r: u8, g: u8, b: u8) {
        if self.current == (r, g, b) {
            return;
        }
        hw_init::ledc_set(pins::LEDC_CH_LED_R, r);
        hw_init::ledc_set(pins::LEDC_CH_LED_G, g);
        hw_init::ledc_set(pins::LEDC_CH_LED_B, b);
        self.current = (r, g, b);
    }

    pub fn current_colour(&self) -> (u8, u8, u8) {
        self.current
    }
}

impl Default for StatusLed {
    fn default() -> Self {
        Self::new()
    }
}
