//! Device state machine: one function-pointer state per [`Mode`].
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  StateTable                                              │
//! │  ┌──────────┬───────────┬──────────┬───────────────────┐ │
//! │  │ Mode     │ on_enter  │ on_exit  │ on_update         │ │
//! │  ├──────────┼───────────┼──────────┼───────────────────┤ │
//! │  │ AutoMode │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │ │
//! │  │ Study    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │ │
//! │  │ Relax    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │ │
//! │  │ Sleep    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │ │
//! │  │ Away     │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │ │
//! │  │ Error    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │ │
//! │  └──────────┴───────────┴──────────┴───────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut FsmContext`, which owns
//! the one [`DeviceState`](context::DeviceState) on the device. Nothing
//! outside these handlers writes it.
//!
//! The alarm sub-state (idle / armed / triggered / silenced) is
//! orthogonal to the mode and lives in [`alarm`].

pub mod alarm;
pub mod context;
pub mod states;

use core::fmt;

use context::FsmContext;
use log::info;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Mode (state identity)
// ---------------------------------------------------------------------------

/// Operating mode of the room. Must stay in sync with the state table
/// built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    AutoMode = 0,
    Study = 1,
    Relax = 2,
    Sleep = 3,
    Away = 4,
    Error = 5,
}

impl Mode {
    /// Total number of modes, used to size the table array.
    pub const COUNT: usize = 6;

    pub const ALL: [Mode; Self::COUNT] = [
        Self::AutoMode,
        Self::Study,
        Self::Relax,
        Self::Sleep,
        Self::Away,
        Self::Error,
    ];

    /// Convert an index back to `Mode`.  Panics on out-of-range in
    /// debug builds; returns `Error` in release.
    pub fn from_index(idx: usize) -> Self {
        match Self::ALL.get(idx) {
            Some(m) => *m,
            None => {
                debug_assert!(false, "invalid mode index: {idx}");
                Self::Error
            }
        }
    }

    /// Wire and display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::AutoMode => "AUTO_MODE",
            Self::Study => "STUDY",
            Self::Relax => "RELAX",
            Self::Sleep => "SLEEP",
            Self::Away => "AWAY",
            Self::Error => "ERROR",
        }
    }

    /// Parse a mode string from the backend or the command channel.
    /// Case-insensitive; `AUTO` and `ALERT` are accepted as aliases.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let eq = |name: &str| s.eq_ignore_ascii_case(name);
        if eq("AUTO_MODE") || eq("AUTO") || eq("auto mode") {
            Some(Self::AutoMode)
        } else if eq("STUDY") {
            Some(Self::Study)
        } else if eq("RELAX") {
            Some(Self::Relax)
        } else if eq("SLEEP") {
            Some(Self::Sleep)
        } else if eq("AWAY") {
            Some(Self::Away)
        } else if eq("ERROR") || eq("ALERT") {
            Some(Self::Error)
        } else {
            None
        }
    }

    /// Modes in which the alarm is armed.
    pub fn is_alarm_mode(self) -> bool {
        matches!(self, Self::Sleep | Self::Away)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which actor last set the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// A button on the device.
    Local,
    /// The backend classifier.
    Inferred,
    /// The companion app over the command channel.
    Remote,
    /// Boot default, "no model" fallback, or a sensor fault.
    Default,
}

impl Provenance {
    /// One-character marker next to the mode on the display.
    pub fn glyph(self) -> char {
        match self {
            Self::Local => 'L',
            Self::Inferred => 'I',
            Self::Remote => 'R',
            Self::Default => 'D',
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::Inferred => "inferred",
            Self::Remote => "remote",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<Mode>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array, no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: Mode,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]) and a mutable
/// [`FsmContext`] that is threaded through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `Mode as usize`.
    table: [StateDescriptor; Mode::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonically increasing tick counter (wraps at u64::MAX).
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
    /// Completed mode transitions since boot.
    transitions: u32,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; Mode::COUNT], initial: Mode) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
            transitions: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in mode {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// Calls `on_update` for the current mode. If it returns
    /// `Some(next)` with a different mode, runs
    /// `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count = self.tick_count.wrapping_add(1);
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        ctx.total_ticks = self.tick_count;

        let next = (self.table[self.current].on_update)(ctx);

        match next {
            Some(next_id) if next_id as usize != self.current => self.transition(next_id, ctx),
            _ => {}
        }
    }

    /// Force an immediate transition, bypassing `on_update`.
    pub fn force_transition(&mut self, next: Mode, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current mode.
    pub fn current_state(&self) -> Mode {
        Mode::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: Mode, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        self.transitions = self.transitions.wrapping_add(1);
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
