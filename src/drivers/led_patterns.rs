//! LED pattern engine with priority-based pattern selection.
//!
//! Generates time-varying RGB values for the mode LED. The main loop
//! calls `tick()` each display cycle and feeds the result to
//! [`IndicatorPort::set_led`](crate::app::ports::IndicatorPort::set_led).
//!
//! ## Priority hierarchy (highest first)
//!
//! 1. **Alarm**: rapid red flash while the alarm rings
//! 2. **Mode**: the mode colour; ERROR pulses, SLEEP is dark
//! 3. **Connectivity**: shown when the mode layer steps aside because the
//!    mode is stale
//!
//! ## Pattern types
//!
//! | Pattern      | Description                      | Rate   |
//! |-------------|----------------------------------|--------|
//! | Solid        | Constant colour                  | -      |
//! | SlowPulse    | Triangular brightness fade       | 1 Hz   |
//! | FastBlink    | On/off square wave               | 4 Hz   |
//! | Breathing    | Smooth ramp up/down              | 0.5 Hz |
//! | DoubleBlink  | Two quick flashes, then pause    | 1 Hz   |
//! | RapidFlash   | Very fast on/off                 | 8 Hz   |

use crate::app::ports::ConnectivityStatus;
use crate::fsm::Mode;

/// Colour as (R, G, B) tuple, each 0–255.
pub type Rgb = (u8, u8, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternId {
    Solid,
    SlowPulse,
    FastBlink,
    Breathing,
    DoubleBlink,
    RapidFlash,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Alarm,
    Mode,
    Connectivity,
}

#[derive(Debug, Clone, Copy)]
struct PatternRequest {
    colour: Rgb,
    pattern: PatternId,
    layer: Layer,
}

/// LED pattern engine. Stack-allocated, no heap.
pub struct LedPatternEngine {
    phase_ms: u32,
    active: Option<PatternRequest>,
    alarm: Option<PatternRequest>,
    mode: Option<PatternRequest>,
    connectivity: Option<PatternRequest>,
}

impl LedPatternEngine {
    pub fn new() -> Self {
        Self {
            phase_ms: 0,
            active: None,
            alarm: None,
            mode: None,
            connectivity: None,
        }
    }

    /// Set or clear the ringing-alarm layer.
    pub fn set_alarm(&mut self, ringing: bool) {
        self.alarm = ringing.then_some(PatternRequest {
            colour: COLOUR_ALARM,
            pattern: PatternId::RapidFlash,
            layer: Layer::Alarm,
        });
    }

    /// Set the mode layer from the mode and its colour. A stale mode
    /// clears the layer so the connectivity layer shows through.
    pub fn set_mode(&mut self, mode: Mode, colour: Rgb, stale: bool) {
        if stale {
            self.mode = None;
            return;
        }
        let pattern = match mode {
            Mode::Error => PatternId::SlowPulse,
            Mode::Sleep => PatternId::Off,
            Mode::AutoMode => PatternId::Breathing,
            Mode::Study | Mode::Relax | Mode::Away => PatternId::Solid,
        };
        self.mode = Some(PatternRequest {
            colour,
            pattern,
            layer: Layer::Mode,
        });
    }

    pub fn set_connectivity(&mut self, status: ConnectivityStatus) {
        let (colour, pattern) = match status {
            ConnectivityStatus::Connected => (COLOUR_CONNECTED, PatternId::Solid),
            ConnectivityStatus::Connecting => (COLOUR_CONNECTING, PatternId::FastBlink),
            ConnectivityStatus::Degraded(_) => (COLOUR_DEGRADED, PatternId::SlowPulse),
            ConnectivityStatus::AwaitingCredentials => (COLOUR_PROVISIONING, PatternId::DoubleBlink),
            ConnectivityStatus::Disconnected => (COLOUR_DEGRADED, PatternId::Off),
        };
        self.connectivity = Some(PatternRequest {
            colour,
            pattern,
            layer: Layer::Connectivity,
        });
    }

    /// Clear all patterns; the LED will be off.
    pub fn clear_all(&mut self) {
        self.alarm = None;
        self.mode = None;
        self.connectivity = None;
        self.active = None;
        self.phase_ms = 0;
    }

    /// Advance the pattern phase and return the current RGB output.
    /// `delta_ms` is the time since the last call.
    pub fn tick(&mut self, delta_ms: u32) -> Rgb {
        self.phase_ms = self.phase_ms.wrapping_add(delta_ms);

        let selected = self.alarm.or(self.mode).or(self.connectivity);
        let reset_phase = match (&self.active, &selected) {
            (Some(prev), Some(next)) => prev.layer != next.layer || prev.pattern != next.pattern,
            (None, Some(_)) => true,
            _ => false,
        };
        if reset_phase {
            self.phase_ms = 0;
        }
        self.active = selected;

        match &self.active {
            Some(req) => self.generate(req.colour, req.pattern),
            None => (0, 0, 0),
        }
    }

    fn generate(&self, colour: Rgb, pattern: PatternId) -> Rgb {
        match pattern {
            PatternId::Solid => colour,
            PatternId::Off => (0, 0, 0),
            PatternId::SlowPulse => scale(colour, triangle(self.phase_ms, 1000)),
            PatternId::Breathing => scale(colour, triangle(self.phase_ms, 2000)),
            PatternId::FastBlink => gate(colour, (self.phase_ms % 250) < 125),
            PatternId::DoubleBlink => {
                let cycle = self.phase_ms % 1000;
                gate(colour, cycle < 100 || (200..300).contains(&cycle))
            }
            PatternId::RapidFlash => gate(colour, (self.phase_ms % 125) < 63),
        }
    }
}

impl Default for LedPatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Triangular brightness curve: 0→255→0 over `period_ms`. Starts dark.
fn triangle(phase_ms: u32, period_ms: u32) -> u8 {
    let pos = u64::from(phase_ms % period_ms);
    let half = u64::from(period_ms) / 2;
    let rise = if pos < half { pos } else { u64::from(period_ms) - pos };
    ((rise * 255) / half) as u8
}

fn scale((r, g, b): Rgb, brightness: u8) -> Rgb {
    let k = u16::from(brightness);
    let f = |c: u8| ((u16::from(c) * k) / 255) as u8;
    (f(r), f(g), f(b))
}

fn gate(colour: Rgb, on: bool) -> Rgb {
    if on { colour } else { (0, 0, 0) }
}

pub const COLOUR_ALARM: Rgb = (255, 0, 0);
pub const COLOUR_PROVISIONING: Rgb = (128, 0, 255);
pub const COLOUR_CONNECTING: Rgb = (0, 100, 255);
pub const COLOUR_CONNECTED: Rgb = (0, 255, 50);
pub const COLOUR_DEGRADED: Rgb = (255, 200, 0);
