//! Dual INMP441 microphone front end.
//!
//! Both microphones share one I²S frame (left slot = `noise1`, right slot =
//! `noise2`). Each tick drains whatever the DMA buffer holds without waiting
//! and reduces it to one RMS value per slot.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::SensorError;

/// Bytes drained per read (256 stereo frames of 32-bit slots).
pub const CAPTURE_BYTES: usize = 2048;

static SIM_RMS_BITS: [AtomicU32; 2] = [AtomicU32::new(0), AtomicU32::new(0)];
static SIM_FAIL: AtomicU32 = AtomicU32::new(0);

/// Inject RMS levels for the simulated microphones; `None` simulates an
/// empty DMA buffer.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_levels(levels: Option<(f32, f32)>) {
    match levels {
        Some((l, r)) => {
            SIM_RMS_BITS[0].store(l.to_bits(), Ordering::Relaxed);
            SIM_RMS_BITS[1].store(r.to_bits(), Ordering::Relaxed);
            SIM_FAIL.store(0, Ordering::Relaxed);
        }
        None => SIM_FAIL.store(1, Ordering::Relaxed),
    }
}

/// RMS of each slot of an interleaved stereo capture. The INMP441 puts its
/// 24-bit sample in the upper bits of a 32-bit slot; the top 16 bits are
/// used. Returns `None` for an empty capture.
pub fn stereo_rms(frames: &[[i32; 2]]) -> Option<(f32, f32)> {
    if frames.is_empty() {
        return None;
    }
    let (mut l_sq, mut r_sq) = (0f64, 0f64);
    for [l, r] in frames {
        let l = f64::from(l >> 16);
        let r = f64::from(r >> 16);
        l_sq += l * l;
        r_sq += r * r;
    }
    let n = frames.len() as f64;
    Some(((l_sq / n).sqrt() as f32, (r_sq / n).sqrt() as f32))
}

pub struct Microphones {
    #[cfg(target_os = "espidf")]
    buf: [u8; CAPTURE_BYTES],
}

impl Microphones {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            buf: [0; CAPTURE_BYTES],
        }
    }

    #[cfg(target_os = "espidf")]
    pub fn read(&mut self) -> Result<(f32, f32), SensorError> {
        let n = crate::drivers::hw_init::i2s_read(&mut self.buf);
        let mut frames = [[0i32; 2]; CAPTURE_BYTES / 8];
        let count = n / 8;
        for (i, frame) in frames.iter_mut().take(count).enumerate() {
            let b = &self.buf[i * 8..i * 8 + 8];
            frame[0] = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            frame[1] = i32::from_le_bytes([b[4], b[5], b[6], b[7]]);
        }
        stereo_rms(&frames[..count]).ok_or(SensorError::I2sReadFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn read(&mut self) -> Result<(f32, f32), SensorError> {
        if SIM_FAIL.load(Ordering::Relaxed) != 0 {
            return Err(SensorError::I2sReadFailed);
        }
        Ok((
            f32::from_bits(SIM_RMS_BITS[0].load(Ordering::Relaxed)),
            f32::from_bits(SIM_RMS_BITS[1].load(Ordering::Relaxed)),
        ))
    }
}

impl Default for Microphones {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_empty_capture_is_none() {
        assert_eq!(stereo_rms(&[]), None);
    }

    #[test]
    fn rms_uses_upper_sixteen_bits_per_slot() {
        let frames = [[100 << 16, -(300 << 16)], [-(100 << 16), 300 << 16]];
        let (l, r) = stereo_rms(&frames).unwrap();
        assert!((l - 100.0).abs() < 1e-3);
        assert!((r - 300.0).abs() < 1e-3);
    }

    #[test]
    fn silence_is_zero() {
        let (l, r) = stereo_rms(&[[0, 0]; 16]).unwrap();
        assert_eq!((l, r), (0.0, 0.0));
    }
}
