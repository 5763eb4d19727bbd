//! Non-blocking buzzer sequencer.
//!
//! A cue is a short list of (frequency, duration) steps. `tick()` advances
//! through them against the uptime clock and reports tone changes; the
//! caller drives the buzzer through
//! [`IndicatorPort::set_tone`](crate::app::ports::IndicatorPort::set_tone).
//! Nothing here sleeps.
//!
//! The alarm ring is not a cue: it loops for as long as `set_ringing(true)`
//! holds and pre-empts any cue.

use crate::drivers::hw_init;
use crate::pins;

/// One step: `freq_hz` of 0 is a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    freq_hz: u32,
    ms: u32,
}

const fn step(freq_hz: u32, ms: u32) -> Step {
    Step { freq_hz, ms }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Startup,
    ModeSwitch,
    Select,
    Back,
}

const STARTUP: &[Step] = &[step(1000, 100), step(2000, 100)];
const MODE_SWITCH: &[Step] = &[step(1500, 100)];
const SELECT: &[Step] = &[step(2000, 50)];
const BACK: &[Step] = &[step(500, 50)];
const RING: &[Step] = &[step(2000, 200), step(0, 200)];

impl Cue {
    fn steps(self) -> &'static [Step] {
        match self {
            Self::Startup => STARTUP,
            Self::ModeSwitch => MODE_SWITCH,
            Self::Select => SELECT,
            Self::Back => BACK,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Playing {
    Idle,
    Cue { steps: &'static [Step], idx: usize, until_ms: u64 },
    Ring { idx: usize, until_ms: u64 },
}

pub struct BuzzerSequencer {
    playing: Playing,
    ringing: bool,
    /// Tone last reported to the caller.
    output: Option<u32>,
}

impl BuzzerSequencer {
    pub fn new() -> Self {
        Self {
            playing: Playing::Idle,
            ringing: false,
            output: None,
        }
    }

    /// Start a cue, replacing any cue in progress. Ignored while ringing.
    pub fn play(&mut self, cue: Cue, now_ms: u64) {
        if self.ringing {
            return;
        }
        let steps = cue.steps();
        self.playing = Playing::Cue {
            steps,
            idx: 0,
            until_ms: now_ms + u64::from(steps[0].ms),
        };
    }

    pub fn set_ringing(&mut self, ringing: bool, now_ms: u64) {
        if ringing == self.ringing {
            return;
        }
        self.ringing = ringing;
        self.playing = if ringing {
            Playing::Ring {
                idx: 0,
                until_ms: now_ms + u64::from(RING[0].ms),
            }
        } else {
            Playing::Idle
        };
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.playing, Playing::Idle)
    }

    /// Advance. Returns `Some(tone)` when the output must change, where
    /// `tone` is `None` for silence.
    pub fn tick(&mut self, now_ms: u64) -> Option<Option<u32>> {
        let wanted = match self.playing {
            Playing::Idle => None,
            Playing::Cue {
                steps,
                mut idx,
                mut until_ms,
            } => {
                while now_ms >= until_ms && idx < steps.len() {
                    idx += 1;
                    if let Some(s) = steps.get(idx) {
                        until_ms += u64::from(s.ms);
                    }
                }
                match steps.get(idx) {
                    Some(s) => {
                        self.playing = Playing::Cue { steps, idx, until_ms };
                        tone(s.freq_hz)
                    }
                    None => {
                        self.playing = Playing::Idle;
                        None
                    }
                }
            }
            Playing::Ring { mut idx, mut until_ms } => {
                while now_ms >= until_ms {
                    idx = (idx + 1) % RING.len();
                    until_ms += u64::from(RING[idx].ms);
                }
                self.playing = Playing::Ring { idx, until_ms };
                tone(RING[idx].freq_hz)
            }
        };
        if wanted == self.output {
            return None;
        }
        self.output = wanted;
        Some(wanted)
    }
}

impl Default for BuzzerSequencer {
    fn default() -> Self {
        Self::new()
    }
}

fn tone(freq_hz: u32) -> Option<u32> {
    (freq_hz > 0).then_some(freq_hz)
}

/// LEDC-driven passive buzzer: half duty at the requested pitch.
pub struct Buzzer {
    on: bool,
}

impl Buzzer {
    pub fn new() -> Self {
        Self { on: false }
    }

    pub fn set_tone(&mut self, freq_hz: Option<u32>) {
        match freq_hz {
            Some(f) => {
                hw_init::buzzer_freq(f);
                hw_init::ledc_set(pins::LEDC_CH_BUZZER, 128);
                self.on = true;
            }
            None if self.on => {
                hw_init::ledc_set(pins::LEDC_CH_BUZZER, 0);
                self.on = false;
            }
            None => {}
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Default for Buzzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_cue_plays_two_tones_then_stops() {
        let mut b = BuzzerSequencer::new();
        b.play(Cue::Startup, 0);
        assert_eq!(b.tick(0), Some(Some(1000)));
        assert_eq!(b.tick(50), None);
        assert_eq!(b.tick(100), Some(Some(2000)));
        assert_eq!(b.tick(200), Some(None));
        assert!(!b.is_busy());
    }

    #[test]
    fn late_tick_skips_elapsed_steps() {
        let mut b = BuzzerSequencer::new();
        b.play(Cue::Startup, 0);
        assert_eq!(b.tick(500), None);
        assert!(!b.is_busy());
    }

    #[test]
    fn ring_loops_until_cleared() {
        let mut b = BuzzerSequencer::new();
        b.set_ringing(true, 0);
        assert_eq!(b.tick(0), Some(Some(2000)));
        assert_eq!(b.tick(200), Some(None));
        assert_eq!(b.tick(400), Some(Some(2000)));
        assert_eq!(b.tick(1_050), Some(None));
        b.set_ringing(false, 1_100);
        assert_eq!(b.tick(1_100), Some(None));
    }

    #[test]
    fn cues_are_ignored_while_ringing() {
        let mut b = BuzzerSequencer::new();
        b.set_ringing(true, 0);
        b.tick(0);
        b.play(Cue::Select, 10);
        assert_eq!(b.tick(10), None);
    }
}
