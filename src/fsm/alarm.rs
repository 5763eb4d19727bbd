//! Alarm sub-state, composed with the mode.
//!
//! ```text
//!   IDLE ──[enter SLEEP/AWAY]──▶ ARMED ──[threshold held | clock hh:mm]──▶ TRIGGERED
//!    ▲                                                                        │
//!    │                                                                  [any button]
//!    │                                                                        ▼
//!    └──────────────[leave SLEEP/AWAY]───────────────────────────────── SILENCED
//! ```
//!
//! The monitor only decides `armed → triggered`. The other edges are
//! driven by the mode handlers and the input path.

use core::fmt;

use crate::config::RuntimeConfig;
use crate::sensors::window::SensorSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Idle,
    Armed,
    Triggered,
    Silenced,
}

impl AlarmState {
    /// Display marker.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Armed => "A",
            Self::Triggered => "A!",
            Self::Silenced => "A-",
        }
    }

    pub fn is_ringing(self) -> bool {
        self == Self::Triggered
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Triggered => "triggered",
            Self::Silenced => "silenced",
        };
        f.write_str(s)
    }
}

/// One-shot wake alarm at a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockAlarm {
    pub hour: u8,
    pub minute: u8,
    pub enabled: bool,
}

impl ClockAlarm {
    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self {
            hour: cfg.alarm_clock_hour,
            minute: cfg.alarm_clock_minute,
            enabled: cfg.alarm_clock_enabled,
        }
    }

    fn due(&self, wall: Option<(u8, u8)>) -> bool {
        self.enabled && wall == Some((self.hour, self.minute))
    }
}

/// Decides when an armed alarm goes off.
#[derive(Debug, Clone)]
pub struct AlarmMonitor {
    channel: usize,
    threshold: f32,
    hold_ms: u64,
    /// Start of the current run of above-threshold readings.
    above_since: Option<u64>,
    clock: ClockAlarm,
}

impl AlarmMonitor {
    pub fn new(channel: usize, threshold: f32, hold_ms: u32, clock: ClockAlarm) -> Self {
        Self {
            channel,
            threshold,
            hold_ms: u64::from(hold_ms),
            above_since: None,
            clock,
        }
    }

    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self::new(
            usize::from(cfg.alarm_channel),
            cfg.alarm_threshold,
            cfg.alarm_hold_ms,
            ClockAlarm::from_config(cfg),
        )
    }

    /// Next alarm state. Only `Armed` can move; any other state resets the
    /// threshold timer and is returned unchanged.
    pub fn evaluate(
        &mut self,
        state: AlarmState,
        sample: Option<&SensorSample>,
        now_ms: u64,
        wall: Option<(u8, u8)>,
    ) -> AlarmState {
        if state != AlarmState::Armed {
            self.above_since = None;
            return state;
        }

        if self.clock.due(wall) {
            self.clock.enabled = false;
            self.above_since = None;
            return AlarmState::Triggered;
        }

        let above = sample
            .and_then(|s| s.values.get(self.channel))
            .is_some_and(|v| *v >= self.threshold);
        if !above {
            self.above_since = None;
            return state;
        }
        let since = *self.above_since.get_or_insert(now_ms);
        if now_ms.saturating_sub(since) >= self.hold_ms {
            self.above_since = None;
            AlarmState::Triggered
        } else {
            state
        }
    }

    /// Silence a ringing alarm. The clock one-shot is spent either way.
    pub fn silence(&mut self, state: AlarmState) -> AlarmState {
        if state == AlarmState::Triggered {
            self.clock.enabled = false;
            AlarmState::Silenced
        } else {
            state
        }
    }

    pub fn clock(&self) -> ClockAlarm {
        self.clock
    }

    /// Set and enable the clock alarm.
    pub fn set_clock(&mut self, hour: u8, minute: u8) {
        self.clock = ClockAlarm {
            hour: hour % 24,
            minute: minute % 60,
            enabled: true,
        };
    }
}
