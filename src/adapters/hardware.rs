//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns the sensor, button and indicator drivers and exposes them through
//! [`SensorPort`], [`InputPort`] and [`IndicatorPort`]. This is the only
//! module in the system that touches actual hardware; on non-espidf
//! targets the underlying drivers use cfg-gated simulation stubs. The
//! OLED implements [`DisplayPort`](crate::app::ports::DisplayPort) itself.

use embedded_hal::digital::InputPin;
use log::warn;

use crate::app::ports::{IndicatorPort, InputPort, SensorPort};
use crate::drivers::button::{ButtonId, ButtonLines};
use crate::drivers::buzzer::Buzzer;
use crate::drivers::status_led::StatusLed;
use crate::pins;
use crate::sensors::RawReadings;
use crate::sensors::light::LightSensor;
use crate::sensors::motion::MotionSensor;
use crate::sensors::sound::Microphones;

// ── Sensors ───────────────────────────────────────────────────

/// Every sensor on the board, read in channel order.
pub struct SensorBoard {
    right: LightSensor,
    left: LightSensor,
    mics: Microphones,
    motion: MotionSensor,
}

impl SensorBoard {
    pub fn new() -> Self {
        Self {
            right: LightSensor::new(pins::BH1750_ADDR_RIGHT, 0),
            left: LightSensor::new(pins::BH1750_ADDR_LEFT, 1),
            mics: Microphones::new(),
            motion: MotionSensor::new(pins::PIR_GPIO),
        }
    }

    /// Put both light sensors into continuous mode. A sensor that does not
    /// answer is left to fail its reads, which hold the last value.
    pub fn init(&mut self) {
        for sensor in [&mut self.right, &mut self.left] {
            if let Err(e) = sensor.init() {
                warn!("light sensor init: {}", e);
            }
        }
    }
}

impl Default for SensorBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for SensorBoard {
    fn read_raw(&mut self) -> RawReadings {
        let (noise1, noise2) = match self.mics.read() {
            Ok((l, r)) => (Ok(l), Ok(r)),
            Err(e) => (Err(e), Err(e)),
        };
        [
            self.right.read(),
            self.left.read(),
            noise1,
            noise2,
            Ok(self.motion.read()),
        ]
    }
}

// ── Whole board ───────────────────────────────────────────────

/// Concrete adapter that combines sensors, buttons and indicators behind
/// the port traits, so the service can take one `hw` for all three.
pub struct HardwareAdapter<P: InputPin> {
    sensors: SensorBoard,
    buttons: ButtonLines<P>,
    led: StatusLed,
    buzzer: Buzzer,
}

impl<P: InputPin> HardwareAdapter<P> {
    pub fn new(sensors: SensorBoard, buttons: ButtonLines<P>, led: StatusLed, buzzer: Buzzer) -> Self {
        Self {
            sensors,
            buttons,
            led,
            buzzer,
        }
    }

    pub fn led(&self) -> &StatusLed {
        &self.led
    }

    pub fn buzzer(&self) -> &Buzzer {
        &self.buzzer
    }

    pub fn button_read_errors(&self) -> u32 {
        self.buttons.read_errors()
    }
}

impl<P: InputPin> SensorPort for HardwareAdapter<P> {
    fn read_raw(&mut self) -> RawReadings {
        self.sensors.read_raw()
    }
}

impl<P: InputPin> InputPort for HardwareAdapter<P> {
    fn read_buttons(&mut self) -> [bool; ButtonId::COUNT] {
        self.buttons.read_raw()
    }
}

impl<P: InputPin> IndicatorPort for HardwareAdapter<P> {
    fn set_led(&mut self, r: u8, g: u8, b: u8) {
        self.led.set_colour(r, g, b);
    }

    fn set_tone(&mut self, freq_hz: Option<u32>) {
        self.buzzer.set_tone(freq_hz);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::sensors::{light, motion, sound};

    #[test]
    fn board_reads_channels_in_layout_order() {
        light::sim_set_raw(0, Some(120));
        sound::sim_set_levels(Some((10.0, 20.0)));
        motion::sim_set_motion(true);

        let raw = SensorBoard::new().read_raw();
        let lux = raw[0].unwrap();
        assert!((lux - 100.0).abs() < 0.01);
        assert_eq!(raw[2], Ok(10.0));
        assert_eq!(raw[3], Ok(20.0));
        assert_eq!(raw[4], Ok(1.0));

        sound::sim_set_levels(None);
        let raw = SensorBoard::new().read_raw();
        assert_eq!(raw[2], Err(SensorError::I2sReadFailed));
        assert_eq!(raw[3], Err(SensorError::I2sReadFailed));
        motion::sim_set_motion(false);
    }

    /// Pin that always reads low (pressed).
    struct HeldDown;

    impl embedded_hal::digital::ErrorType for HeldDown {
        type Error = core::convert::Infallible;
    }

    impl InputPin for HeldDown {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(false)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(true)
        }
    }

    #[test]
    fn adapter_forwards_to_drivers() {
        let mut hw = HardwareAdapter::new(
            SensorBoard::new(),
            ButtonLines::new([HeldDown, HeldDown, HeldDown, HeldDown]),
            StatusLed::new(),
            Buzzer::new(),
        );
        hw.set_led(1, 2, 3);
        assert_eq!(hw.led().current_colour(), (1, 2, 3));
        hw.set_tone(Some(2000));
        assert!(hw.buzzer().is_on());
        assert_eq!(hw.read_buttons(), [true; 4]);
    }
}
