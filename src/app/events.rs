//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them; the firmware logs them to serial.

use core::fmt;

use super::ports::{ConnectivityStatus, UploadOutcome};
use crate::display::menu::DisplayPage;
use crate::fsm::alarm::AlarmState;
use crate::fsm::{Mode, Provenance};

/// Why a mode input was thrown away instead of applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Remote sequence at or below the last applied one.
    Stale,
    /// A newer inference request was issued after this one.
    Superseded,
    /// A button (or an applied remote command) changed the mode first.
    Preempted,
    /// A local choice is holding off automatic modes.
    OverrideHeld,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stale => "stale",
            Self::Superseded => "superseded",
            Self::Preempted => "preempted",
            Self::OverrideHeld => "manual override",
        };
        f.write_str(s)
    }
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The application service has started (carries the initial mode).
    Started(Mode),

    /// The FSM moved to a different mode.
    ModeChanged {
        from: Mode,
        to: Mode,
        provenance: Provenance,
    },

    /// The mode was re-asserted by a different actor without changing.
    ModeConfirmed { mode: Mode, provenance: Provenance },

    AlarmChanged { from: AlarmState, to: AlarmState },

    /// The wake-up time was edited from the menu.
    AlarmClockSet { hour: u8, minute: u8 },

    WindowSealed { sequence: u32, held_samples: usize },

    InferenceRequested { request: u32, window: u32 },

    /// An inference reply, or a "no model" fallback, was not applied.
    InferenceDiscarded { request: Option<u32>, reason: DiscardReason },

    UploadOutcome { window: u32, outcome: UploadOutcome },

    RemoteDiscarded { sequence: u64, reason: DiscardReason },

    ConnectivityChanged(ConnectivityStatus),

    StaleChanged(bool),

    PageChanged(DisplayPage),

    ConfigSaved,
}
