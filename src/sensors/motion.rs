//! PIR motion sensor. The module drives its output HIGH while it sees motion.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(target_os = "espidf"))]
static SIM_MOTION: AtomicBool = AtomicBool::new(false);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_motion(active: bool) {
    SIM_MOTION.store(active, Ordering::Relaxed);
}

pub struct MotionSensor {
    _gpio: i32,
}

impl MotionSensor {
    pub fn new(gpio: i32) -> Self {
        Self { _gpio: gpio }
    }

    /// 1.0 while motion is detected, 0.0 otherwise.
    pub fn read(&self) -> f32 {
        if self.line_high() { 1.0 } else { 0.0 }
    }

    #[cfg(target_os = "espidf")]
    fn line_high(&self) -> bool {
        crate::drivers::hw_init::gpio_read(self._gpio)
    }

    #[cfg(not(target_os = "espidf"))]
    fn line_high(&self) -> bool {
        SIM_MOTION.load(Ordering::Relaxed)
    }
}
