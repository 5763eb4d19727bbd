//! Concrete state handler functions and table builder.
//!
//! Each mode is defined by plain `fn` pointers, no closures, no dynamic
//! dispatch, no heap. Every mode is reachable from every other; what moves
//! the machine is the single [`ModeRequest`](super::context::ModeRequest)
//! the service leaves on the blackboard each cycle.
//!
//! ```text
//!            ┌──────────────────────[request]──────────────────────┐
//!            ▼                                                     │
//!   AUTO_MODE ◀──▶ STUDY ◀──▶ RELAX ◀──▶ SLEEP* ◀──▶ AWAY* ◀──▶ ERROR
//!
//!   * alarm armed while in these modes
//! ```
//!
//! Per cycle, before any transition, every handler applies the page
//! change, a pending silence, the stale flag and (in SLEEP/AWAY) the alarm
//! monitor, in that order.

use super::alarm::AlarmState;
use super::context::FsmContext;
use super::{Mode, StateDescriptor};
use crate::drivers::buzzer::Cue;
use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; Mode::COUNT] {
    [
        // Index 0: Auto
        StateDescriptor {
            id: Mode::AutoMode,
            name: "AUTO_MODE",
            on_enter: Some(auto_enter),
            on_exit: None,
            on_update: plain_update,
        },
        // Index 1: Study
        StateDescriptor {
            id: Mode::Study,
            name: "STUDY",
            on_enter: Some(study_enter),
            on_exit: None,
            on_update: plain_update,
        },
        // Index 2: Relax
        StateDescriptor {
            id: Mode::Relax,
            name: "RELAX",
            on_enter: Some(relax_enter),
            on_exit: None,
            on_update: plain_update,
        },
        // Index 3: Sleep
        StateDescriptor {
            id: Mode::Sleep,
            name: "SLEEP",
            on_enter: Some(sleep_enter),
            on_exit: Some(alarm_mode_exit),
            on_update: guarded_update,
        },
        // Index 4: Away
        StateDescriptor {
            id: Mode::Away,
            name: "AWAY",
            on_enter: Some(away_enter),
            on_exit: Some(alarm_mode_exit),
            on_update: guarded_update,
        },
        // Index 5: Error
        StateDescriptor {
            id: Mode::Error,
            name: "ERROR",
            on_enter: Some(error_enter),
            on_exit: None,
            on_update: plain_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared entry / update steps
// ═══════════════════════════════════════════════════════════════════════════

/// Mode LED colours.
pub fn mode_colour(mode: Mode) -> (u8, u8, u8) {
    match mode {
        Mode::AutoMode => (200, 200, 200),
        Mode::Study => (120, 170, 230),
        Mode::Relax => (255, 80, 0),
        Mode::Sleep => (0, 0, 0),
        Mode::Away => (180, 80, 200),
        Mode::Error => (255, 40, 40),
    }
}

fn enter_mode(ctx: &mut FsmContext, mode: Mode) {
    ctx.device.mode = mode;
    ctx.device.last_transition_ms = ctx.now_ms;
    ctx.commands.mode_rgb = mode_colour(mode);
    ctx.device.alarm = match (mode.is_alarm_mode(), ctx.device.alarm) {
        (true, AlarmState::Idle) => AlarmState::Armed,
        (true, kept) => kept,
        (false, _) => AlarmState::Idle,
    };
}

/// Page, silence and stale flag. Runs every cycle in every mode.
fn housekeeping(ctx: &mut FsmContext) {
    if let Some(page) = ctx.page_request.take() {
        ctx.device.page = page;
    }

    if core::mem::take(&mut ctx.silence_requested) {
        let next = ctx.alarm.silence(ctx.device.alarm);
        if next != ctx.device.alarm {
            info!("ALARM: silenced");
            ctx.device.alarm = next;
        }
    }

    let stale = ctx
        .link_down_since
        .is_some_and(|t| ctx.now_ms.saturating_sub(t) >= u64::from(ctx.config.stale_after_ms));
    if stale != ctx.device.stale {
        if stale {
            warn!("FSM: link down for {} ms, mode marked stale", ctx.config.stale_after_ms);
        }
        ctx.device.stale = stale;
    }
}

/// Take the pending request. The provenance is recorded even when the mode
/// does not change, so a confirmation from a new actor is visible.
fn apply_request(ctx: &mut FsmContext) -> Option<Mode> {
    let req = ctx.request.take()?;
    ctx.device.provenance = req.provenance;
    if req.mode == ctx.device.mode {
        debug!("FSM: {} confirmed ({})", req.mode, req.provenance);
        return None;
    }
    info!("FSM: {} requested ({})", req.mode, req.provenance);
    ctx.commands.cue = Some(Cue::ModeSwitch);
    Some(req.mode)
}

// ═══════════════════════════════════════════════════════════════════════════
//  Unguarded modes (AUTO_MODE, STUDY, RELAX, ERROR)
// ═══════════════════════════════════════════════════════════════════════════

fn auto_enter(ctx: &mut FsmContext) {
    enter_mode(ctx, Mode::AutoMode);
}

fn study_enter(ctx: &mut FsmContext) {
    enter_mode(ctx, Mode::Study);
}

fn relax_enter(ctx: &mut FsmContext) {
    enter_mode(ctx, Mode::Relax);
}

fn error_enter(ctx: &mut FsmContext) {
    enter_mode(ctx, Mode::Error);
    warn!("ERROR: entered ({})", ctx.device.provenance);
}

fn plain_update(ctx: &mut FsmContext) -> Option<Mode> {
    housekeeping(ctx);
    apply_request(ctx)
}

// ═══════════════════════════════════════════════════════════════════════════
//  Guarded modes (SLEEP, AWAY): alarm armed
// ═══════════════════════════════════════════════════════════════════════════

fn sleep_enter(ctx: &mut FsmContext) {
    enter_mode(ctx, Mode::Sleep);
    info!("SLEEP: alarm {}", ctx.device.alarm);
}

fn away_enter(ctx: &mut FsmContext) {
    enter_mode(ctx, Mode::Away);
    info!("AWAY: alarm {}", ctx.device.alarm);
}

fn alarm_mode_exit(ctx: &mut FsmContext) {
    if ctx.device.alarm == AlarmState::Triggered {
        info!("ALARM: cleared by leaving {}", ctx.device.mode);
    }
}

fn guarded_update(ctx: &mut FsmContext) -> Option<Mode> {
    housekeeping(ctx);

    let before = ctx.device.alarm;
    let after = ctx.alarm.evaluate(
        before,
        ctx.latest_sample.as_ref(),
        ctx.now_ms,
        ctx.wall_clock,
    );
    if after != before {
        warn!("ALARM: triggered in {}", ctx.device.mode);
        ctx.device.alarm = after;
    }

    apply_request(ctx)
}
