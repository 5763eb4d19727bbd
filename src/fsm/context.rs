//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to. It owns the [`DeviceState`], the inputs gathered for this
//! cycle, and the indicator outputs the handlers request. Think of it as
//! the "blackboard" in a blackboard architecture: the service writes the
//! inputs, the handlers turn them into state.

use super::alarm::{AlarmMonitor, AlarmState};
use super::{Mode, Provenance};
use crate::config::RuntimeConfig;
use crate::display::menu::DisplayPage;
use crate::drivers::buzzer::Cue;
use crate::sensors::window::SensorSample;

// ---------------------------------------------------------------------------
// Device state (written only by state handlers)
// ---------------------------------------------------------------------------

/// The one device state. Everything else sees copies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceState {
    pub mode: Mode,
    pub alarm: AlarmState,
    pub page: DisplayPage,
    /// Uptime at the last mode change.
    pub last_transition_ms: u64,
    pub provenance: Provenance,
    /// The link has been down long enough that the mode may be out of
    /// date.
    pub stale: bool,
}

impl DeviceState {
    pub fn boot(mode: Mode) -> Self {
        Self {
            mode,
            alarm: AlarmState::Idle,
            page: DisplayPage::Home,
            last_transition_ms: 0,
            provenance: Provenance::Default,
            stale: false,
        }
    }
}

/// A request to put the device in `mode`, with who asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    pub mode: Mode,
    pub provenance: Provenance,
}

// ---------------------------------------------------------------------------
// Indicator commands (written by state handlers; consumed by main loop)
// ---------------------------------------------------------------------------

/// Outputs the handlers request. The main loop hands them to the LED
/// and buzzer drivers after the tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorCommands {
    /// Base colour for the current mode (R, G, B).
    pub mode_rgb: (u8, u8, u8),
    /// One-shot cue to start; consumed by the caller.
    pub cue: Option<Cue>,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

pub struct FsmContext {
    // -- Timing --
    /// Ticks elapsed since the current mode was entered.
    pub ticks_in_state: u64,
    pub total_ticks: u64,
    /// Uptime at the start of this cycle.
    pub now_ms: u64,

    // -- Device state --
    pub device: DeviceState,

    // -- Inputs for this cycle (cleared by the handlers) --
    /// Winning mode request, if any.
    pub request: Option<ModeRequest>,
    /// Page produced by menu navigation.
    pub page_request: Option<DisplayPage>,
    /// A button went down while the alarm rang.
    pub silence_requested: bool,

    // -- Inputs that persist across cycles --
    pub latest_sample: Option<SensorSample>,
    /// Local time of day, when known.
    pub wall_clock: Option<(u8, u8)>,
    /// Uptime at which the link was last seen leaving CONNECTED.
    pub link_down_since: Option<u64>,

    pub alarm: AlarmMonitor,

    // -- Outputs --
    pub commands: IndicatorCommands,

    // -- Configuration --
    pub config: RuntimeConfig,
}

impl FsmContext {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            now_ms: 0,
            device: DeviceState::boot(Mode::AutoMode),
            request: None,
            page_request: None,
            silence_requested: false,
            latest_sample: None,
            wall_clock: None,
            link_down_since: Some(0),
            alarm: AlarmMonitor::from_config(&config),
            commands: IndicatorCommands::default(),
            config,
        }
    }

    /// Milliseconds spent in the current mode.
    pub fn ms_in_mode(&self) -> u64 {
        self.now_ms.saturating_sub(self.device.last_transition_ms)
    }

    /// Queue a mode request for the next tick. A later request in the same
    /// cycle replaces an earlier one.
    pub fn request_mode(&mut self, mode: Mode, provenance: Provenance) {
        self.request = Some(ModeRequest { mode, provenance });
    }

    /// Take the one-shot cue, if any.
    pub fn take_cue(&mut self) -> Option<Cue> {
        self.commands.cue.take()
    }
}
