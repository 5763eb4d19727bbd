//! BH1750 ambient light sensor driver.
//!
//! Two sensors share the I²C bus at 0x23 and 0x5C. Each runs in continuous
//! high-resolution mode (opcode 0x10) after power-on, so a read is a single
//! two-byte transfer with no conversion wait.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads through the I²C master installed by `hw_init`.
//! On host/test: reads from static atomics for injection.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::SensorError;

/// Power-on opcode.
pub const CMD_POWER_ON: u8 = 0x01;
/// Continuous high-resolution mode, 1 lx resolution.
pub const CMD_CONTINUOUS_HRES: u8 = 0x10;

/// Largest lux value the 16-bit result can express.
pub const MAX_LUX: f32 = u16::MAX as f32 / 1.2;

/// `u32::MAX` marks "bus error" for the simulated sensor.
const SIM_FAIL: u32 = u32::MAX;
static SIM_RAW: [AtomicU32; 2] = [AtomicU32::new(0), AtomicU32::new(0)];

/// Inject the raw 16-bit count (or a bus failure with `None`) for sensor
/// `idx` (0 = right, 1 = left).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_raw(idx: usize, raw: Option<u16>) {
    if let Some(slot) = SIM_RAW.get(idx) {
        slot.store(raw.map_or(SIM_FAIL, u32::from), Ordering::Relaxed);
    }
}

/// Convert a raw BH1750 count to lux (datasheet accuracy factor 1.2).
pub fn raw_to_lux(raw: u16) -> f32 {
    raw as f32 / 1.2
}

pub struct LightSensor {
    addr: u8,
    sim_idx: usize,
    failures: u32,
}

impl LightSensor {
    pub fn new(addr: u8, sim_idx: usize) -> Self {
        Self {
            addr,
            sim_idx,
            failures: 0,
        }
    }

    /// Power the sensor on and select continuous high-resolution mode.
    pub fn init(&mut self) -> Result<(), SensorError> {
        #[cfg(target_os = "espidf")]
        {
            use crate::drivers::hw_init;
            hw_init::i2c_write(self.addr, &[CMD_POWER_ON])
                .and_then(|()| hw_init::i2c_write(self.addr, &[CMD_CONTINUOUS_HRES]))
                .map_err(|_| SensorError::I2cReadFailed)?;
        }
        log::info!("BH1750 @0x{:02X} ready", self.addr);
        Ok(())
    }

    pub fn read(&mut self) -> Result<f32, SensorError> {
        let result = self.read_raw().map(raw_to_lux);
        if result.is_err() {
            self.failures = self.failures.saturating_add(1);
        }
        result
    }

    /// Bus failures since boot.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    #[cfg(target_os = "espidf")]
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        let _ = self.sim_idx;
        let mut buf = [0u8; 2];
        crate::drivers::hw_init::i2c_read(self.addr, &mut buf)
            .map_err(|_| SensorError::I2cReadFailed)?;
        Ok(u16::from_be_bytes(buf))
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        let raw = SIM_RAW
            .get(self.sim_idx)
            .map_or(SIM_FAIL, |s| s.load(Ordering::Relaxed));
        u16::try_from(raw).map_err(|_| SensorError::I2cReadFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_count_scales_by_datasheet_factor() {
        assert!((raw_to_lux(120) - 100.0).abs() < 1e-3);
        assert_eq!(raw_to_lux(0), 0.0);
        assert!((raw_to_lux(u16::MAX) - MAX_LUX).abs() < 1e-3);
    }

    #[test]
    fn simulated_bus_failure_is_counted() {
        // Index 1 is only touched by this test.
        let mut s = LightSensor::new(0x5C, 1);
        sim_set_raw(1, None);
        assert_eq!(s.read(), Err(SensorError::I2cReadFailed));
        assert_eq!(s.failures(), 1);
        sim_set_raw(1, Some(600));
        assert!((s.read().unwrap() - 500.0).abs() < 1e-3);
        assert_eq!(s.failures(), 1);
    }
}
