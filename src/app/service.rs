//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the FSM, its context and the components that feed
//! it (windowing engine, button bank, buzzer sequencer, LED patterns and
//! display renderer). All I/O flows through port traits injected at call
//! sites, making the entire service testable with mock adapters.
//!
//! ```text
//!  SensorPort ─┐                                  ┌──▶ EventSink
//!  InputPort ──┼─▶ ┌──────────────────────────┐ ──┤
//!  BackendPort ┘   │        AppService        │   ├──▶ IndicatorPort
//!                  │ arbitration · FSM · UI   │   └──▶ DisplayPort
//!                  └──────────────────────────┘
//! ```
//!
//! ## One cycle
//!
//! 1. buttons (silence, menu navigation, local mode choice)
//! 2. remote commands, gated by sequence number
//! 3. sensor sample; on a sealed window, inference request then upload
//! 4. inference replies
//! 5. connectivity and the link-down timestamp
//! 6. FSM tick, which applies the single winning request
//! 7. events, indicators, display
//!
//! Only the FSM handlers write [`DeviceState`]. This service decides which
//! request reaches them: a local choice in a cycle beats everything else
//! in that cycle, and an inference reply is dropped if anything with
//! higher priority changed the mode after it was requested.

use heapless::String;
use log::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::display::menu::{self, MenuAction};
use crate::display::{DisplayRenderer, Snapshot};
use crate::drivers::button::{ButtonBank, ButtonEvent, ButtonId, RepeatTiming};
use crate::drivers::buzzer::{BuzzerSequencer, Cue};
use crate::drivers::led_patterns::LedPatternEngine;
use crate::fsm::alarm::ClockAlarm;
use crate::fsm::context::{DeviceState, FsmContext};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, Mode, Provenance};
use crate::scheduler::DueTicks;
use crate::sensors::WindowingEngine;
use crate::sensors::window::SensorWindow;

use super::commands::{InferenceReply, InferenceResult, RemoteCommand};
use super::events::{AppEvent, DiscardReason};
use super::ports::{
    BackendPort, ConfigPort, ConnectivityStatus, DisplayPort, EventSink, IndicatorPort,
    InferenceTicket, InputPort, SensorPort,
};

/// Unsaved config is written this long after the last edit.
const AUTO_SAVE_DELAY_MS: u64 = 5_000;

/// The inference request whose reply may still be applied.
#[derive(Debug, Clone, Copy)]
struct PendingInference {
    request: u32,
    /// Arbitration epoch when the request went out.
    epoch: u32,
}

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,

    windows: WindowingEngine,
    buttons: ButtonBank,
    buzzer: BuzzerSequencer,
    leds: LedPatternEngine,
    renderer: DisplayRenderer,

    connectivity: ConnectivityStatus,
    /// Highest remote sequence applied so far.
    last_applied_seq: Option<u64>,
    /// Bumped whenever a local or remote choice changes the requested mode.
    epoch: u32,
    pending_inference: Option<PendingInference>,
    /// Set by a local non-Auto choice while `manual_override_holds`.
    manual_hold: bool,
    /// A local choice was made this cycle.
    local_this_cycle: bool,
    /// A remote command was applied this cycle.
    remote_this_cycle: bool,

    device_id: String<16>,
    last_cycle_ms: u64,
    config_dirty: bool,
    dirty_since_ms: u64,
}

impl AppService {
    /// Construct the service from configuration.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: RuntimeConfig, device_id: &str) -> Self {
        let mut buttons = ButtonBank::new(config.debounce_polls);
        if config.button_repeat {
            buttons = buttons.with_auto_repeat(RepeatTiming {
                delay_polls: config.polls_for(config.repeat_delay_ms),
                rate_polls: config.polls_for(config.repeat_rate_ms),
            });
        }
        let ctx = FsmContext::new(config);
        let fsm = Fsm::new(build_state_table(), ctx.device.mode);

        let mut id = String::new();
        for c in device_id.chars() {
            if id.push(c).is_err() {
                break;
            }
        }

        Self {
            fsm,
            ctx,
            windows: WindowingEngine::new(),
            buttons,
            buzzer: BuzzerSequencer::new(),
            leds: LedPatternEngine::new(),
            renderer: DisplayRenderer::new(),
            connectivity: ConnectivityStatus::Disconnected,
            last_applied_seq: None,
            epoch: 0,
            pending_inference: None,
            manual_hold: false,
            local_this_cycle: false,
            remote_this_cycle: false,
            device_id: id,
            last_cycle_ms: 0,
            config_dirty: false,
            dirty_since_ms: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter the initial mode and play the startup cue.
    pub fn start(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        self.ctx.now_ms = now_ms;
        self.ctx.link_down_since = Some(now_ms);
        self.last_cycle_ms = now_ms;
        self.fsm.start(&mut self.ctx);
        self.buzzer.play(Cue::Startup, now_ms);
        self.leds.set_connectivity(self.connectivity);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("AppService started in {}", self.fsm.current_state());
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run one cycle for the cadences in `due`.
    ///
    /// The `hw` parameter satisfies the sensor, input and indicator ports at
    /// once, which keeps the port boundary explicit without a double
    /// mutable borrow of the board.
    pub fn cycle(
        &mut self,
        now_ms: u64,
        due: DueTicks,
        hw: &mut (impl SensorPort + InputPort + IndicatorPort),
        backend: &mut impl BackendPort,
        display: &mut impl DisplayPort,
        sink: &mut impl EventSink,
    ) {
        self.ctx.now_ms = now_ms;
        self.local_this_cycle = false;
        self.remote_this_cycle = false;
        let before = self.ctx.device;

        // 1. Buttons
        if due.buttons {
            self.handle_buttons(hw, now_ms, sink);
        }

        // 2. Remote commands
        while let Some(cmd) = backend.poll_command() {
            self.handle_remote(cmd, sink);
        }

        // 3. Sensor sample and window hand-off
        if due.sample {
            let outcome = self.windows.sample(hw);
            self.ctx.latest_sample = Some(outcome.sample);
            if let Some(window) = outcome.window {
                self.handle_window(&window, backend, sink);
            }
        }

        // 4. Inference replies
        while let Some(reply) = backend.poll_inference() {
            self.handle_inference(reply, sink);
        }

        // 5. Connectivity
        self.track_connectivity(backend.status(), now_ms, sink);

        // 6. State machine
        self.fsm.tick(&mut self.ctx);
        if let Some(cue) = self.ctx.take_cue() {
            self.buzzer.play(cue, now_ms);
        }
        self.sync_clock_alarm(now_ms);

        // 7. Outputs
        self.emit_state_changes(&before, sink);
        self.drive_indicators(hw, now_ms);
        if due.display {
            self.render(display);
        }
        self.last_cycle_ms = now_ms;
    }

    // ── Buttons ───────────────────────────────────────────────

    fn handle_buttons(&mut self, input: &mut impl InputPort, now_ms: u64, sink: &mut impl EventSink) {
        let events = self.buttons.poll(input.read_buttons());
        let mut page = self.ctx.page_request.unwrap_or(self.ctx.device.page);

        for event in events {
            if !event.is_press() {
                continue;
            }
            // Any press while ringing only silences.
            if self.ctx.device.alarm.is_ringing() {
                if matches!(event, ButtonEvent::Pressed(_)) {
                    self.ctx.silence_requested = true;
                    self.buzzer.play(Cue::Back, now_ms);
                }
                continue;
            }

            let clock = self.ctx.alarm.clock();
            let nav = menu::navigate(page, event, (clock.hour, clock.minute));
            page = nav.page;
            match event.id() {
                ButtonId::Select => self.buzzer.play(Cue::Select, now_ms),
                ButtonId::Back => self.buzzer.play(Cue::Back, now_ms),
                ButtonId::Up | ButtonId::Down => {}
            }

            match nav.action {
                Some(MenuAction::SelectMode(mode)) => self.choose_locally(mode),
                Some(MenuAction::SaveAlarm { hour, minute }) => {
                    self.ctx.alarm.set_clock(hour, minute);
                    info!("ALARM: clock set to {:02}:{:02}", hour, minute);
                    sink.emit(&AppEvent::AlarmClockSet { hour, minute });
                }
                None => {}
            }
        }

        if page != self.ctx.device.page {
            self.ctx.page_request = Some(page);
        }
    }

    fn choose_locally(&mut self, mode: Mode) {
        self.ctx.request_mode(mode, Provenance::Local);
        self.local_this_cycle = true;
        self.epoch = self.epoch.wrapping_add(1);
        self.manual_hold = self.ctx.config.manual_override_holds && mode != Mode::AutoMode;
        debug!("local choice {} (hold={})", mode, self.manual_hold);
    }

    // ── Remote commands ───────────────────────────────────────

    fn handle_remote(&mut self, cmd: RemoteCommand, sink: &mut impl EventSink) {
        let reason = if self.last_applied_seq.is_some_and(|last| cmd.sequence <= last) {
            Some(DiscardReason::Stale)
        } else if self.local_this_cycle {
            Some(DiscardReason::Preempted)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!(
                "remote #{} ({}) discarded: {} (last applied {:?})",
                cmd.sequence, cmd.mode, reason, self.last_applied_seq
            );
            sink.emit(&AppEvent::RemoteDiscarded {
                sequence: cmd.sequence,
                reason,
            });
            return;
        }

        info!("remote #{} -> {} \"{}\"", cmd.sequence, cmd.mode, cmd.annotation);
        self.last_applied_seq = Some(cmd.sequence);
        self.ctx.request_mode(cmd.mode, Provenance::Remote);
        self.remote_this_cycle = true;
        self.epoch = self.epoch.wrapping_add(1);
    }

    // ── Windows and inference ─────────────────────────────────

    fn handle_window(
        &mut self,
        window: &SensorWindow,
        backend: &mut impl BackendPort,
        sink: &mut impl EventSink,
    ) {
        sink.emit(&AppEvent::WindowSealed {
            sequence: window.sequence(),
            held_samples: window.held_samples(),
        });

        if window.fully_held() {
            warn!("window {}: every channel failed throughout", window.sequence());
            self.offer(Mode::Error, Provenance::Default, None, sink);
        } else {
            match backend.infer(window) {
                InferenceTicket::Pending(request) => {
                    self.pending_inference = Some(PendingInference {
                        request,
                        epoch: self.epoch,
                    });
                    sink.emit(&AppEvent::InferenceRequested {
                        request,
                        window: window.sequence(),
                    });
                }
                InferenceTicket::NoModel => {
                    self.pending_inference = None;
                    let fallback = self.ctx.config.default_mode;
                    self.offer_automatic(fallback, Provenance::Default, None, sink);
                }
            }
        }

        let outcome = backend.upload(window, self.ctx.device.mode);
        sink.emit(&AppEvent::UploadOutcome {
            window: window.sequence(),
            outcome,
        });
    }

    fn handle_inference(&mut self, reply: InferenceReply, sink: &mut impl EventSink) {
        let Some(pending) = self.pending_inference else {
            debug!("inference #{} arrived with nothing pending", reply.request);
            sink.emit(&AppEvent::InferenceDiscarded {
                request: Some(reply.request),
                reason: DiscardReason::Superseded,
            });
            return;
        };
        if reply.request != pending.request {
            sink.emit(&AppEvent::InferenceDiscarded {
                request: Some(reply.request),
                reason: DiscardReason::Superseded,
            });
            return;
        }
        self.pending_inference = None;
        if pending.epoch != self.epoch {
            sink.emit(&AppEvent::InferenceDiscarded {
                request: Some(reply.request),
                reason: DiscardReason::Preempted,
            });
            return;
        }

        let (mode, provenance) = match reply.result {
            InferenceResult::Mode(mode) => (mode, Provenance::Inferred),
            InferenceResult::NoModel => (self.ctx.config.default_mode, Provenance::Default),
        };
        self.offer_automatic(mode, provenance, Some(reply.request), sink);
    }

    /// Inferred or default mode: yields to a manual hold and to anything
    /// chosen this cycle.
    fn offer_automatic(
        &mut self,
        mode: Mode,
        provenance: Provenance,
        request: Option<u32>,
        sink: &mut impl EventSink,
    ) {
        if self.manual_hold {
            sink.emit(&AppEvent::InferenceDiscarded {
                request,
                reason: DiscardReason::OverrideHeld,
            });
            return;
        }
        self.offer(mode, provenance, request, sink);
    }

    fn offer(
        &mut self,
        mode: Mode,
        provenance: Provenance,
        request: Option<u32>,
        sink: &mut impl EventSink,
    ) {
        if self.local_this_cycle || self.remote_this_cycle {
            sink.emit(&AppEvent::InferenceDiscarded {
                request,
                reason: DiscardReason::Preempted,
            });
            return;
        }
        self.ctx.request_mode(mode, provenance);
    }

    // ── Connectivity ──────────────────────────────────────────

    fn track_connectivity(&mut self, status: ConnectivityStatus, now_ms: u64, sink: &mut impl EventSink) {
        if status.is_connected() {
            self.ctx.link_down_since = None;
        } else if self.ctx.link_down_since.is_none() {
            self.ctx.link_down_since = Some(now_ms);
        }
        if status != self.connectivity {
            info!("link: {} -> {}", self.connectivity, status);
            self.connectivity = status;
            self.leds.set_connectivity(status);
            sink.emit(&AppEvent::ConnectivityChanged(status));
        }
    }

    // ── Outputs ───────────────────────────────────────────────

    fn emit_state_changes(&self, before: &DeviceState, sink: &mut impl EventSink) {
        let after = &self.ctx.device;
        if after.mode != before.mode {
            sink.emit(&AppEvent::ModeChanged {
                from: before.mode,
                to: after.mode,
                provenance: after.provenance,
            });
        } else if after.provenance != before.provenance {
            sink.emit(&AppEvent::ModeConfirmed {
                mode: after.mode,
                provenance: after.provenance,
            });
        }
        if after.alarm != before.alarm {
            sink.emit(&AppEvent::AlarmChanged {
                from: before.alarm,
                to: after.alarm,
            });
        }
        if after.stale != before.stale {
            sink.emit(&AppEvent::StaleChanged(after.stale));
        }
        if after.page != before.page {
            sink.emit(&AppEvent::PageChanged(after.page));
        }
    }

    fn drive_indicators(&mut self, out: &mut impl IndicatorPort, now_ms: u64) {
        let device = &self.ctx.device;
        let ringing = device.alarm.is_ringing();

        self.leds.set_alarm(ringing);
        self.leds.set_mode(device.mode, self.ctx.commands.mode_rgb, device.stale);
        let delta = now_ms.saturating_sub(self.last_cycle_ms) as u32;
        let (r, g, b) = self.leds.tick(delta);
        out.set_led(r, g, b);

        self.buzzer.set_ringing(ringing, now_ms);
        if let Some(tone) = self.buzzer.tick(now_ms) {
            out.set_tone(tone);
        }
    }

    fn render(&mut self, display: &mut impl DisplayPort) {
        let snap = Snapshot {
            device: self.ctx.device,
            connectivity: self.connectivity,
            latest: self.ctx.latest_sample,
            wall_clock: self.ctx.wall_clock,
            alarm_clock: self.ctx.alarm.clock(),
            windows_sealed: self.windows.windows_sealed(),
            device_id: &self.device_id,
        };
        self.renderer.render(&snap, display);
    }

    // ── Inputs from the platform ──────────────────────────────

    /// Local time of day, once the clock has been synchronised.
    pub fn set_wall_clock(&mut self, hm: Option<(u8, u8)>) {
        self.ctx.wall_clock = hm;
    }

    // ── Queries ───────────────────────────────────────────────

    /// Copy of the device state.
    pub fn device(&self) -> DeviceState {
        self.ctx.device
    }

    pub fn mode(&self) -> Mode {
        self.fsm.current_state()
    }

    pub fn connectivity(&self) -> ConnectivityStatus {
        self.connectivity
    }

    pub fn last_applied_sequence(&self) -> Option<u64> {
        self.last_applied_seq
    }

    pub fn awaiting_inference(&self) -> Option<u32> {
        self.pending_inference.map(|p| p.request)
    }

    pub fn windows_sealed(&self) -> u32 {
        self.windows.windows_sealed()
    }

    pub fn clock_alarm(&self) -> ClockAlarm {
        self.ctx.alarm.clock()
    }

    pub fn transitions(&self) -> u32 {
        self.fsm.transitions()
    }

    /// Clone of the live configuration.
    pub fn current_config(&self) -> RuntimeConfig {
        self.ctx.config.clone()
    }

    // ── Config dirty-flag management ──────────────────────────

    /// Copy the clock alarm back into the config when the menu or a
    /// trigger changed it.
    fn sync_clock_alarm(&mut self, now_ms: u64) {
        let clock = self.ctx.alarm.clock();
        if clock == ClockAlarm::from_config(&self.ctx.config) {
            return;
        }
        self.ctx.config.alarm_clock_hour = clock.hour;
        self.ctx.config.alarm_clock_minute = clock.minute;
        self.ctx.config.alarm_clock_enabled = clock.enabled;
        self.mark_config_dirty(now_ms);
    }

    pub fn mark_config_dirty(&mut self, now_ms: u64) {
        if !self.config_dirty {
            self.config_dirty = true;
            self.dirty_since_ms = now_ms;
        }
    }

    /// Save the config once it has been dirty for a few seconds.
    /// Returns `true` if the config was saved.
    pub fn auto_save_if_needed(
        &mut self,
        now_ms: u64,
        storage: &impl ConfigPort,
        sink: &mut impl EventSink,
    ) -> bool {
        if !self.config_dirty || now_ms.saturating_sub(self.dirty_since_ms) < AUTO_SAVE_DELAY_MS {
            return false;
        }
        match storage.save(&self.ctx.config) {
            Ok(()) => {
                self.config_dirty = false;
                info!("Config auto-saved to NVS");
                sink.emit(&AppEvent::ConfigSaved);
                true
            }
            Err(e) => {
                warn!("Config auto-save failed: {}", e);
                // Retry after another delay rather than every cycle.
                self.dirty_since_ms = now_ms;
                false
            }
        }
    }

    /// Whether the config has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }
}
