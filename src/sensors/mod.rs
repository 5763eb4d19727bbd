//! Sensor subsystem: individual drivers, the hold-last-value [`SensorHub`]
//! and the [`WindowingEngine`] that turns the sample stream into windows.
//!
//! The windowing engine is the only component that samples sensors. It is
//! invoked once per sample tick and always appends exactly one row, whether
//! or not the underlying reads succeeded.

pub mod light;
pub mod motion;
pub mod sound;
pub mod window;

use log::{debug, warn};

use crate::app::ports::SensorPort;
use crate::error::SensorError;
use window::{ChannelId, SensorSample, SensorWindow, WindowBuilder, CHANNELS};

/// Channels read from hardware; the remaining two are derived.
pub const RAW_CHANNELS: usize = 5;

/// One read attempt per hardware channel, in [`ChannelId`] order.
pub type RawReadings = [Result<f32, SensorError>; RAW_CHANNELS];

/// Reject physically implausible values before they reach a window.
fn check_range(ch: ChannelId, v: f32) -> Result<f32, SensorError> {
    let ok = match ch {
        ChannelId::Lux1 | ChannelId::Lux2 => (0.0..=light::MAX_LUX).contains(&v),
        ChannelId::Noise1 | ChannelId::Noise2 => (0.0..=32_768.0).contains(&v),
        ChannelId::Motion => v == 0.0 || v == 1.0,
        ChannelId::LuxDiff | ChannelId::NoiseDiff => v.is_finite(),
    };
    if ok { Ok(v) } else { Err(SensorError::OutOfRange) }
}

/// Applies per-channel hold-last-value and derives the difference channels.
pub struct SensorHub {
    last_good: [Option<f32>; RAW_CHANNELS],
    failures: [u32; RAW_CHANNELS],
}

impl SensorHub {
    pub const fn new() -> Self {
        Self {
            last_good: [None; RAW_CHANNELS],
            failures: [0; RAW_CHANNELS],
        }
    }

    /// Build one sample from a round of raw reads.
    ///
    /// A failed or out-of-range channel repeats its last good value (0.0 if
    /// it never produced one) and is flagged in `held`.
    pub fn compose(&mut self, raw: RawReadings) -> SensorSample {
        let mut sample = SensorSample::zeroed();

        for (i, reading) in raw.into_iter().enumerate() {
            let ch = ChannelId::ALL[i];
            match reading.and_then(|v| check_range(ch, v)) {
                Ok(v) => {
                    self.last_good[i] = Some(v);
                    sample.values[i] = v;
                }
                Err(e) => {
                    self.failures[i] = self.failures[i].saturating_add(1);
                    sample.values[i] = self.last_good[i].unwrap_or(0.0);
                    sample.held |= ch.mask();
                    debug!("sensor {:?}: {} (holding {:.1})", ch, e, sample.values[i]);
                }
            }
        }

        Self::derive(
            &mut sample,
            ChannelId::LuxDiff,
            ChannelId::Lux1,
            ChannelId::Lux2,
        );
        Self::derive(
            &mut sample,
            ChannelId::NoiseDiff,
            ChannelId::Noise1,
            ChannelId::Noise2,
        );
        sample
    }

    fn derive(sample: &mut SensorSample, out: ChannelId, a: ChannelId, b: ChannelId) {
        sample.values[out as usize] = sample.value(a) - sample.value(b);
        if sample.is_held(a) || sample.is_held(b) {
            sample.held |= out.mask();
        }
    }

    /// Failed reads per hardware channel since boot.
    pub fn failures(&self) -> [u32; RAW_CHANNELS] {
        self.failures
    }
}

impl Default for SensorHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one sample tick.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub sample: SensorSample,
    /// Present on the tick that completed a window.
    pub window: Option<SensorWindow>,
}

/// Samples all channels on each tick and seals a window every
/// [`window::WINDOW_LEN`] ticks.
pub struct WindowingEngine {
    hub: SensorHub,
    builder: WindowBuilder,
}

impl WindowingEngine {
    pub const fn new() -> Self {
        Self {
            hub: SensorHub::new(),
            builder: WindowBuilder::new(),
        }
    }

    pub fn sample(&mut self, port: &mut impl SensorPort) -> SampleOutcome {
        let sample = self.hub.compose(port.read_raw());
        if sample.fully_held() {
            warn!("sensor tick: every channel failed");
        }

        let window = self.builder.push(sample);
        if let Some(w) = &window {
            debug!(
                "window {} sealed ({} rows held)",
                w.sequence(),
                w.held_samples()
            );
        }
        SampleOutcome { sample, window }
    }

    /// Rows collected towards the in-progress window.
    pub fn progress(&self) -> usize {
        self.builder.len()
    }

    pub fn windows_sealed(&self) -> u32 {
        self.builder.sealed()
    }
}

impl Default for WindowingEngine {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = assert!(RAW_CHANNELS + 2 == CHANNELS);
