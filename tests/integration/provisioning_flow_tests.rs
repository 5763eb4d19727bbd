//! Credentials and configuration: what is persisted in NVS and how the
//! session and service pick it up again.

use aura::adapters::nvs::NvsAdapter;
use aura::adapters::wifi::LinkState;
use aura::app::events::AppEvent;
use aura::app::ports::{ConfigPort, ConnectivityStatus, StoragePort};
use aura::config::RuntimeConfig;
use aura::drivers::button::ButtonId;
use aura::fsm::Mode;

use crate::mock_hw::{Rig, fast_config, networks};

#[test]
fn saved_networks_are_tried_in_rotation() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.save_networks(&networks(&["Home", "Office"])).unwrap();
    let loaded = nvs.load_networks();
    assert_eq!(loaded.len(), 2);

    let mut rig = Rig::boot(fast_config(), loaded, &[LinkState::Failed, LinkState::Up]);
    rig.run_for(2_000);

    assert_eq!(rig.app.connectivity(), ConnectivityStatus::Connected);
    let link = rig.client.session().link();
    assert_eq!(link.attempts, 2);
    assert_eq!(link.last_ssid.as_deref(), Some("Office"));
}

#[test]
fn without_credentials_the_device_runs_locally() {
    let mut rig = Rig::boot(fast_config(), networks(&[]), &[]);
    rig.run_for(2_000);

    assert_eq!(rig.app.connectivity(), ConnectivityStatus::AwaitingCredentials);
    assert_eq!(rig.client.session().link().attempts, 0);

    rig.pick(1);
    assert_eq!(rig.app.mode(), Mode::Study);
    rig.run_for(300);
    assert!(rig.panel.row(0).ends_with("NOC"));
}

#[test]
fn provisioning_later_brings_the_link_up() {
    let mut rig = Rig::boot(fast_config(), networks(&[]), &[]);
    rig.run_for(1_500);
    assert!(rig.app.device().stale);

    let session = rig.client.session_mut();
    session.link_mut().script(&[LinkState::Up]);
    session.provision(networks(&["Home"]));
    rig.run_for(300);

    assert_eq!(rig.app.connectivity(), ConnectivityStatus::Connected);
    assert!(!rig.app.device().stale);
}

#[test]
fn clock_alarm_edit_is_saved_after_a_pause() {
    let mut rig = Rig::boot(fast_config(), networks(&[]), &[]);
    rig.pick(5);
    rig.press(ButtonId::Up);
    rig.press(ButtonId::Select);
    rig.press(ButtonId::Select);
    assert!(rig.app.is_config_dirty());
    assert!(!rig.sink.events.contains(&AppEvent::ConfigSaved));

    rig.run_for(5_000 + 2 * Rig::housekeeping_period());
    assert!(rig.sink.events.contains(&AppEvent::ConfigSaved));
    assert!(!rig.app.is_config_dirty());

    let stored = rig.nvs.load().unwrap();
    assert_eq!(stored.alarm_clock_hour, 9);
    assert_eq!(stored.alarm_clock_minute, 0);
    assert!(stored.alarm_clock_enabled);
}

#[test]
fn corrupted_config_blob_boots_with_defaults() {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write("aura", "config", &[0x01, 0xFF, 0xFF, 0x00]).unwrap();
    assert_eq!(nvs.load().unwrap(), RuntimeConfig::default());
}

#[test]
fn invalid_config_is_never_persisted() {
    let nvs = NvsAdapter::new().unwrap();
    let bad = RuntimeConfig {
        button_poll_ms: 5_000,
        ..RuntimeConfig::default()
    };
    assert!(nvs.save(&bad).is_err());
    assert!(!nvs.exists("aura", "config"));
}
