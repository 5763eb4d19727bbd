//! Flows through the real backend client and session: uploads,
//! inference, remote commands and link loss.

use aura::adapters::wifi::LinkState;
use aura::app::events::{AppEvent, DiscardReason};
use aura::app::ports::{ConnectivityStatus, UploadOutcome};
use aura::config::RuntimeConfig;
use aura::fsm::{Mode, Provenance};
use aura::sensors::window::{CHANNELS, WINDOW_LEN};

use crate::mock_hw::{Rig, fast_config, networks};

/// Seal a window and return the id of the `get-mode` request it produced.
fn seal_and_take_request(rig: &mut Rig) -> u64 {
    rig.seal_window();
    let frames = rig.sent();
    let get_mode = frames
        .iter()
        .find(|f| f["route"] == "get-mode")
        .expect("inference request sent");
    get_mode["id"].as_u64().unwrap()
}

#[test]
fn connects_and_shows_link_on_display() {
    let mut rig = Rig::online(fast_config());
    rig.run_for(300);

    assert_eq!(rig.app.connectivity(), ConnectivityStatus::Connected);
    assert!(rig.channels.link_up());
    assert!(rig.channels.listening());
    assert!(rig.panel.row(0).ends_with("NET"));
}

#[test]
fn sealed_window_is_uploaded_and_classified() {
    let mut rig = Rig::online(fast_config());
    rig.seal_window();

    let frames = rig.sent();
    assert_eq!(frames.len(), 2);
    let status = frames.iter().find(|f| f["route"] == "status").unwrap();
    assert_eq!(status["mode"], "AUTO_MODE");
    let data = status["data"].as_array().unwrap();
    assert_eq!(data.len(), WINDOW_LEN);
    assert!(data.iter().all(|row| row.as_array().unwrap().len() == CHANNELS));

    let id = frames.iter().find(|f| f["route"] == "get-mode").unwrap()["id"]
        .as_u64()
        .unwrap();
    rig.backend_says(&format!(r#"{{"route":"get-mode","id":{id},"mode":"study"}}"#));
    rig.run_for(100);

    let d = rig.app.device();
    assert_eq!(d.mode, Mode::Study);
    assert_eq!(d.provenance, Provenance::Inferred);
    assert_eq!(rig.app.awaiting_inference(), None);
}

#[test]
fn next_upload_carries_the_current_mode() {
    let mut rig = Rig::online(fast_config());
    rig.seal_window();
    rig.sent();
    rig.pick(2);

    rig.seal_window();
    let frames = rig.sent();
    let status = frames.iter().find(|f| f["route"] == "status").unwrap();
    assert_eq!(status["mode"], "RELAX");
}

#[test]
fn button_beats_a_late_inference_reply() {
    let mut rig = Rig::online(fast_config());
    let id = seal_and_take_request(&mut rig);

    rig.pick(2);
    rig.backend_says(&format!(r#"{{"route":"get-mode","id":{id},"mode":"SLEEP"}}"#));
    rig.run_for(100);

    assert_eq!(rig.app.mode(), Mode::Relax);
    assert_eq!(rig.app.device().provenance, Provenance::Local);
    assert_eq!(
        rig.sink.count(|e| matches!(
            e,
            AppEvent::InferenceDiscarded {
                reason: DiscardReason::Preempted,
                ..
            }
        )),
        1
    );
}

#[test]
fn no_model_reply_applies_the_default_mode() {
    let config = RuntimeConfig {
        default_mode: Mode::Relax,
        ..fast_config()
    };
    let mut rig = Rig::online(config);
    let id = seal_and_take_request(&mut rig);

    rig.backend_says(&format!(r#"{{"route":"get-mode","id":{id},"mode":"default"}}"#));
    rig.run_for(100);

    assert_eq!(rig.app.mode(), Mode::Relax);
    assert_eq!(rig.app.device().provenance, Provenance::Default);
}

#[test]
fn remote_commands_apply_in_sequence_order() {
    let mut rig = Rig::online(fast_config());

    rig.app_says(1, r#"{"mode":"relax","transcription":"wind down","sequence":5}"#);
    rig.run_for(100);
    assert_eq!(rig.app.mode(), Mode::Relax);
    assert_eq!(rig.app.device().provenance, Provenance::Remote);
    assert_eq!(rig.app.last_applied_sequence(), Some(5));
    assert_eq!(rig.acks(), vec![(1, "received:RELAX".to_string())]);

    rig.app_says(2, r#"{"mode":"study","sequence":4}"#);
    rig.run_for(100);
    assert_eq!(rig.app.mode(), Mode::Relax);
    assert!(rig.sink.events.contains(&AppEvent::RemoteDiscarded {
        sequence: 4,
        reason: DiscardReason::Stale,
    }));

    rig.app_says(3, r#"{"mode":"SLEEP","sequence":6}"#);
    rig.run_for(100);
    assert_eq!(rig.app.mode(), Mode::Sleep);
    assert_eq!(rig.app.last_applied_sequence(), Some(6));
}

#[test]
fn malformed_command_gets_error_ack() {
    let mut rig = Rig::online(fast_config());
    rig.app_says(9, "turn the lights off");
    rig.app_says(10, r#"{"mode":"party","sequence":1}"#);
    rig.run_for(100);

    assert_eq!(
        rig.acks(),
        vec![(9, "error".to_string()), (10, "error".to_string())]
    );
    assert_eq!(rig.app.mode(), Mode::AutoMode);
    assert_eq!(rig.client.stats().commands_rejected, 2);
}

#[test]
fn link_loss_flags_stale_and_keeps_mode() {
    let config = RuntimeConfig {
        manual_override_holds: true,
        ..fast_config()
    };
    let mut rig = Rig::online(config);
    rig.pick(1);
    assert_eq!(rig.app.mode(), Mode::Study);

    rig.client.session_mut().link_mut().drop_link();
    rig.run_for(1_200);
    let d = rig.app.device();
    assert!(d.stale);
    assert_eq!(d.mode, Mode::Study);
    assert!(!rig.app.connectivity().is_connected());
    assert!(rig.panel.row(3).starts_with("STALE"));
    assert!(!rig.channels.link_up());

    rig.client.session_mut().link_mut().script(&[LinkState::Up]);
    rig.run_for(3_000);
    assert_eq!(rig.app.connectivity(), ConnectivityStatus::Connected);
    assert!(!rig.app.device().stale);
    assert_eq!(rig.app.mode(), Mode::Study);
}

#[test]
fn offline_window_is_dropped_and_falls_back() {
    let config = RuntimeConfig {
        default_mode: Mode::Relax,
        ..fast_config()
    };
    let mut rig = Rig::boot(config, networks(&[]), &[]);
    rig.seal_window();

    assert!(rig.sent().is_empty());
    assert!(rig.sink.events.contains(&AppEvent::UploadOutcome {
        window: 0,
        outcome: UploadOutcome::Dropped,
    }));
    assert_eq!(rig.app.mode(), Mode::Relax);
    assert_eq!(rig.app.device().provenance, Provenance::Default);
}
