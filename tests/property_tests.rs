//! Property and fuzz-style tests for robustness of core data structures.
//!
//! Runs on host (x86_64) only; proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use std::collections::VecDeque;

use aura::adapters::wifi::BackoffPolicy;
use aura::app::commands::{InferenceReply, RemoteCommand};
use aura::app::events::AppEvent;
use aura::app::ports::{
    BackendPort, ConnectivityStatus, DisplayPort, EventSink, IndicatorPort, InferenceTicket,
    InputPort, SensorPort, UploadOutcome,
};
use aura::app::service::AppService;
use aura::config::RuntimeConfig;
use aura::drivers::button::{ButtonBank, ButtonId};
use aura::error::{DisplayError, SensorError};
use aura::fsm::{Mode, Provenance};
use aura::rpc::codec::{FrameDecoder, encode_frame};
use aura::scheduler::DueTicks;
use aura::sensors::window::{CHANNELS, WINDOW_LEN};
use aura::sensors::{RawReadings, WindowingEngine};
use proptest::prelude::*;

// ── Windowing: shape and hold-last-value ──────────────────────

struct Replay(VecDeque<RawReadings>);

impl SensorPort for Replay {
    fn read_raw(&mut self) -> RawReadings {
        self.0.pop_front().unwrap_or([Err(SensorError::NotReady); 5])
    }
}

fn arb_reading(max: f32) -> impl Strategy<Value = Result<f32, SensorError>> {
    prop_oneof![
        4 => (0.0f32..max).prop_map(Ok),
        1 => Just(Err(SensorError::I2cReadFailed)),
    ]
}

fn arb_round() -> impl Strategy<Value = RawReadings> {
    (
        arb_reading(60_000.0),
        arb_reading(60_000.0),
        arb_reading(30_000.0),
        arb_reading(30_000.0),
        prop_oneof![Just(Ok(0.0f32)), Just(Ok(1.0f32)), Just(Err(SensorError::GpioReadFailed))],
    )
        .prop_map(|(a, b, c, d, e)| [a, b, c, d, e])
}

proptest! {
    /// Every sealed window is exactly WINDOW_LEN × CHANNELS of finite
    /// values, and a failed channel repeats the value before it.
    #[test]
    fn windows_are_full_and_hold_last_value(
        rounds in proptest::collection::vec(arb_round(), WINDOW_LEN..WINDOW_LEN * 3),
    ) {
        let mut engine = WindowingEngine::new();
        let mut port = Replay(rounds.iter().copied().collect());
        let mut sealed = 0usize;

        for _ in 0..rounds.len() {
            if let Some(w) = engine.sample(&mut port).window {
                sealed += 1;
                prop_assert_eq!(w.rows().len(), WINDOW_LEN);
                for row in w.rows() {
                    prop_assert_eq!(row.len(), CHANNELS);
                    prop_assert!(row.iter().all(|v| v.is_finite()));
                }
                for i in 1..WINDOW_LEN {
                    let (prev, cur) = (w.sample(i - 1).unwrap(), w.sample(i).unwrap());
                    for ch in 0..5 {
                        let id = aura::sensors::window::ChannelId::ALL[ch];
                        if cur.is_held(id) {
                            prop_assert_eq!(cur.value(id), prev.value(id));
                        }
                    }
                }
            }
        }
        prop_assert_eq!(sealed, rounds.len() / WINDOW_LEN);
    }
}

// ── Debounce ──────────────────────────────────────────────────

proptest! {
    /// Glitches shorter than the debounce count never produce an event.
    #[test]
    fn short_flicker_never_fires(
        debounce in 2u8..6,
        glitches in proptest::collection::vec(1u8..6, 1..20),
    ) {
        let mut bank = ButtonBank::new(debounce);
        let released = [false; ButtonId::COUNT];
        let mut pressed = released;
        pressed[ButtonId::Select as usize] = true;

        for g in glitches {
            let len = g.min(debounce - 1);
            for _ in 0..len {
                prop_assert!(bank.poll(pressed).is_empty());
            }
            prop_assert!(bank.poll(released).is_empty());
        }
        prop_assert!(!bank.is_pressed(ButtonId::Select));
    }

    /// A level held long enough fires exactly one press and one release.
    #[test]
    fn held_level_fires_once(debounce in 1u8..6, hold in 6usize..40) {
        let mut bank = ButtonBank::new(debounce);
        let mut pressed = [false; ButtonId::COUNT];
        pressed[ButtonId::Back as usize] = true;

        let mut events = Vec::new();
        for _ in 0..hold {
            events.extend(bank.poll(pressed));
        }
        for _ in 0..hold {
            events.extend(bank.poll([false; ButtonId::COUNT]));
        }
        prop_assert_eq!(events.len(), 2);
        prop_assert!(events[0].is_press());
    }
}

// ── Remote command ordering ───────────────────────────────────

#[derive(Default)]
struct Quiet {
    commands: VecDeque<RemoteCommand>,
}

impl SensorPort for Quiet {
    fn read_raw(&mut self) -> RawReadings {
        [Ok(100.0), Ok(100.0), Ok(10.0), Ok(10.0), Ok(0.0)]
    }
}

impl InputPort for Quiet {
    fn read_buttons(&mut self) -> [bool; ButtonId::COUNT] {
        [false; ButtonId::COUNT]
    }
}

impl IndicatorPort for Quiet {
    fn set_led(&mut self, _r: u8, _g: u8, _b: u8) {}
    fn set_tone(&mut self, _freq_hz: Option<u32>) {}
}

impl BackendPort for Quiet {
    fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus::Connected
    }

    fn upload(&mut self, _w: &aura::sensors::window::SensorWindow, _m: Mode) -> UploadOutcome {
        UploadOutcome::Sent
    }

    fn infer(&mut self, _w: &aura::sensors::window::SensorWindow) -> InferenceTicket {
        InferenceTicket::NoModel
    }

    fn poll_inference(&mut self) -> Option<InferenceReply> {
        None
    }

    fn poll_command(&mut self) -> Option<RemoteCommand> {
        self.commands.pop_front()
    }
}

impl DisplayPort for Quiet {
    fn draw_row(&mut self, _row: usize, _text: &str) -> Result<(), DisplayError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &AppEvent) {}
}

fn arb_mode() -> impl Strategy<Value = Mode> {
    prop::sample::select(vec![Mode::AutoMode, Mode::Study, Mode::Relax, Mode::Sleep, Mode::Away])
}

proptest! {
    /// Whatever order commands arrive in, the applied sequence only grows
    /// and the final mode is the one carried by the highest sequence.
    #[test]
    fn remote_sequence_is_monotonic(
        cmds in proptest::collection::vec((0u64..50, arb_mode()), 1..30),
    ) {
        let mut app = AppService::new(RuntimeConfig::default(), "AURA-000000");
        let mut io = Quiet::default();
        let mut backend = Quiet::default();
        let mut display = Quiet::default();
        app.start(0, &mut Discard);

        let mut best: Option<(u64, Mode)> = None;
        let mut last = None;
        for (i, (seq, mode)) in cmds.iter().enumerate() {
            backend.commands.push_back(RemoteCommand {
                mode: *mode,
                annotation: String::new(),
                sequence: *seq,
            });
            let now = (i as u64 + 1) * 20;
            app.cycle(now, DueTicks::NETWORK, &mut io, &mut backend, &mut display, &mut Discard);

            if best.is_none_or(|(b, _)| *seq > b) {
                best = Some((*seq, *mode));
            }
            let applied = app.last_applied_sequence();
            prop_assert!(applied >= last);
            last = applied;
        }

        let (seq, mode) = best.unwrap();
        prop_assert_eq!(app.last_applied_sequence(), Some(seq));
        prop_assert_eq!(app.mode(), mode);
        prop_assert_eq!(app.device().provenance, Provenance::Remote);
    }
}

// ── Backoff ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn backoff_is_monotone_and_capped(base in 1u32..10_000, factor in 1u32..100) {
        let max = base.saturating_mul(factor);
        let policy = BackoffPolicy { base_ms: base, max_ms: max };
        let mut prev = 0;
        for failures in 0..40 {
            let d = policy.nominal_ms(failures);
            prop_assert!(d >= prev);
            prop_assert!(d <= max);
            prev = d;
        }
        prop_assert_eq!(policy.nominal_ms(0), base);
        prop_assert_eq!(policy.nominal_ms(39), max);
    }
}

// ── Frame decoder under arbitrary chunking ────────────────────

proptest! {
    #[test]
    fn frames_survive_any_split(
        payload in proptest::collection::vec(any::<u8>(), 1..600),
        cuts in proptest::collection::vec(1usize..50, 1..40),
    ) {
        let mut wire = vec![0u8; payload.len() + 4];
        let n = encode_frame(&payload, &mut wire).unwrap();
        let mut dec = FrameDecoder::new();
        let mut got = None;

        let mut rest = &wire[..n];
        let mut cuts = cuts.into_iter().cycle();
        while !rest.is_empty() {
            let take = cuts.next().unwrap().min(rest.len());
            let mut piece = &rest[..take];
            rest = &rest[take..];
            while !piece.is_empty() {
                let (used, frame) = dec.feed(piece);
                if let Some(f) = frame {
                    got = Some(f.to_vec());
                }
                piece = &piece[used..];
            }
        }
        prop_assert_eq!(got, Some(payload));
    }
}
