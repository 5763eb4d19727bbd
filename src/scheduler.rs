//! Cadence scheduler for the cooperative main loop.
//!
//! Every periodic activity (button poll, sensor sample, network poll,
//! display refresh, housekeeping) has its own period. The scheduler tells a
//! [`SchedulerDelegate`] which cadences came due; the main loop implements
//! the delegate by pushing into the tick queue and later folds the drained
//! ticks into a [`DueTicks`] set for one application cycle.
//!
//! ```text
//!   Scheduler::poll(now) ──▶ SchedulerDelegate::on_tick_due(kind)
//!                                   │
//!                                   ▼
//!                          events::push_event(kind)
//!                                   │
//!                                   ▼
//!                 drain → DueTicks → AppService::cycle()
//! ```
//!
//! A cadence that falls behind (long flash write, slow bus) fires once and
//! re-anchors on the current time instead of bursting to catch up.

use log::debug;

use crate::app::ports::{SchedulerDelegate, TickKind};
use crate::config::RuntimeConfig;

/// Period of the housekeeping cadence (config auto-save, diagnostics).
pub const HOUSEKEEPING_PERIOD_MS: u32 = 1_000;

// ═══════════════════════════════════════════════════════════════
//  Due set
// ═══════════════════════════════════════════════════════════════

/// Which cadences are due in the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueTicks {
    pub buttons: bool,
    pub sample: bool,
    pub network: bool,
    pub display: bool,
    pub housekeeping: bool,
}

impl DueTicks {
    pub const NONE: Self = Self {
        buttons: false,
        sample: false,
        network: false,
        display: false,
        housekeeping: false,
    };
    pub const BUTTONS: Self = Self { buttons: true, ..Self::NONE };
    pub const SAMPLE: Self = Self { sample: true, ..Self::NONE };
    pub const NETWORK: Self = Self { network: true, ..Self::NONE };
    pub const DISPLAY: Self = Self { display: true, ..Self::NONE };
    pub const HOUSEKEEPING: Self = Self { housekeeping: true, ..Self::NONE };
    pub const ALL: Self = Self {
        buttons: true,
        sample: true,
        network: true,
        display: true,
        housekeeping: true,
    };

    pub fn mark(&mut self, kind: TickKind) {
        match kind {
            TickKind::ButtonPoll => self.buttons = true,
            TickKind::Sample => self.sample = true,
            TickKind::Network => self.network = true,
            TickKind::Display => self.display = true,
            TickKind::Housekeeping => self.housekeeping = true,
        }
    }

    pub fn any(&self) -> bool {
        self.buttons || self.sample || self.network || self.display || self.housekeeping
    }
}

impl SchedulerDelegate for DueTicks {
    fn on_tick_due(&mut self, kind: TickKind) {
        self.mark(kind);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct Cadence {
    period_ms: u64,
    next_due_ms: u64,
    missed: u32,
}

/// Fixed-table scheduler, one slot per [`TickKind`].
pub struct Scheduler {
    cadences: [Cadence; TickKind::COUNT],
    started: bool,
}

impl Scheduler {
    pub fn new(config: &RuntimeConfig) -> Self {
        let period = |ms: u32| Cadence {
            period_ms: u64::from(ms.max(1)),
            next_due_ms: 0,
            missed: 0,
        };
        Self {
            cadences: [
                period(config.button_poll_ms),
                period(config.sample_period_ms),
                period(config.network_poll_ms),
                period(config.display_period_ms),
                period(HOUSEKEEPING_PERIOD_MS),
            ],
            started: false,
        }
    }

    /// Re-read periods after a configuration change. Deadlines already
    /// scheduled are kept.
    pub fn reconfigure(&mut self, config: &RuntimeConfig) {
        let periods = [
            config.button_poll_ms,
            config.sample_period_ms,
            config.network_poll_ms,
            config.display_period_ms,
            HOUSEKEEPING_PERIOD_MS,
        ];
        for (slot, ms) in self.cadences.iter_mut().zip(periods) {
            slot.period_ms = u64::from(ms.max(1));
        }
    }

    pub fn period_ms(&self, kind: TickKind) -> u64 {
        self.cadences[kind as usize].period_ms
    }

    /// Times a cadence was found more than one period late.
    pub fn missed(&self, kind: TickKind) -> u32 {
        self.cadences[kind as usize].missed
    }

    /// Fire every cadence whose deadline has passed. The first call
    /// anchors all cadences on `now_ms` and fires each of them once.
    pub fn poll(&mut self, now_ms: u64, delegate: &mut dyn SchedulerDelegate) {
        if !self.started {
            for slot in self.cadences.iter_mut() {
                slot.next_due_ms = now_ms;
            }
            self.started = true;
        }

        for kind in TickKind::ALL {
            let slot = &mut self.cadences[kind as usize];
            if now_ms < slot.next_due_ms {
                continue;
            }
            delegate.on_tick_due(kind);

            let next = slot.next_due_ms + slot.period_ms;
            if next <= now_ms {
                slot.missed = slot.missed.saturating_add(1);
                debug!(
                    "scheduler: {:?} behind by {} ms, re-anchoring",
                    kind,
                    now_ms - slot.next_due_ms
                );
                slot.next_due_ms = now_ms + slot.period_ms;
            } else {
                slot.next_due_ms = next;
            }
        }
    }

    /// Earliest pending deadline, for sizing the idle sleep.
    pub fn next_deadline(&self) -> u64 {
        self.cadences
            .iter()
            .map(|c| c.next_due_ms)
            .min()
            .unwrap_or(0)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
