//! Local flows: buttons, menu, display and the alarm sub-state, with no
//! backend in reach.

use aura::app::events::AppEvent;
use aura::config::RuntimeConfig;
use aura::display::menu::DisplayPage;
use aura::drivers::button::ButtonId;
use aura::fsm::alarm::AlarmState;
use aura::fsm::{Mode, Provenance};

use crate::mock_hw::{Rig, fast_config, networks};

fn offline(config: RuntimeConfig) -> Rig {
    Rig::boot(config, networks(&[]), &[])
}

#[test]
fn boots_to_home_page_in_auto_mode() {
    let mut rig = offline(fast_config());
    rig.run_for(300);

    assert_eq!(rig.sink.events[0], AppEvent::Started(Mode::AutoMode));
    assert_eq!(rig.app.device().page, DisplayPage::Home);
    assert!(rig.panel.row(0).starts_with("AUTO_MODE"));
    assert!(rig.panel.row(0).ends_with("NOC"));
    assert!(rig.panel.row(1).starts_with("L:115 N:41"));
}

#[test]
fn menu_selection_sets_mode_and_returns_home() {
    let mut rig = offline(fast_config());
    rig.pick(1);
    rig.run_for(300);

    let d = rig.app.device();
    assert_eq!(d.mode, Mode::Study);
    assert_eq!(d.provenance, Provenance::Local);
    assert_eq!(d.page, DisplayPage::Home);
    assert!(rig.panel.row(0).starts_with("STUDY [L]"));
}

#[test]
fn browsing_the_menu_never_changes_mode() {
    let mut rig = offline(fast_config());
    rig.run_for(100);
    let before = rig.app.transitions();

    rig.press(ButtonId::Select);
    rig.press(ButtonId::Down);
    rig.press(ButtonId::Down);
    assert!(matches!(rig.app.device().page, DisplayPage::Menu { .. }));
    rig.press(ButtonId::Back);

    assert_eq!(rig.app.mode(), Mode::AutoMode);
    assert_eq!(rig.app.transitions(), before);
    assert_eq!(rig.app.device().page, DisplayPage::Home);
    assert!(rig.sink.count(|e| matches!(e, AppEvent::PageChanged(_))) >= 4);
}

#[test]
fn unchanged_rows_are_not_redrawn() {
    let mut rig = offline(fast_config());
    // Past the stale threshold so the last row has settled too.
    rig.run_for(1_500);
    let writes = rig.panel.row_writes;

    rig.run_for(1_000);
    assert_eq!(rig.panel.row_writes, writes);
}

#[test]
fn panel_failure_forces_full_redraw() {
    let mut rig = offline(fast_config());
    rig.panel.fail = true;
    rig.run_for(500);
    assert_eq!(rig.panel.row_writes, 0);

    rig.panel.fail = false;
    rig.run_for(300);
    assert!(rig.panel.row_writes >= 4);
    assert!(rig.panel.row(0).starts_with("AUTO_MODE"));
    assert!(rig.panel.row(1).starts_with("L:"));
}

#[test]
fn motion_in_away_mode_rings_until_any_key() {
    let mut rig = offline(fast_config());
    rig.pick(3);
    assert_eq!(rig.app.mode(), Mode::Away);
    assert_eq!(rig.app.device().alarm, AlarmState::Armed);
    rig.run_for(500);
    rig.board.tones.clear();

    rig.board.set_motion(true);
    rig.run_for(4_000);
    assert_eq!(rig.app.device().alarm, AlarmState::Triggered);
    assert!(rig.board.rang());
    assert!(rig.panel.row(3).starts_with("ALARM!"));

    rig.press(ButtonId::Up);
    rig.run_for(1_000);
    let d = rig.app.device();
    assert_eq!(d.alarm, AlarmState::Silenced);
    assert_eq!(d.mode, Mode::Away);
    assert_eq!(rig.board.tone(), None);
}

#[test]
fn silencing_press_does_not_move_the_menu() {
    let mut rig = offline(fast_config());
    rig.pick(3);
    rig.board.set_motion(true);
    rig.run_for(4_000);
    assert!(rig.app.device().alarm.is_ringing());

    rig.press(ButtonId::Select);
    assert_eq!(rig.app.device().page, DisplayPage::Home);
    assert_eq!(rig.app.mode(), Mode::Away);
}

#[test]
fn clock_alarm_wakes_a_sleeping_room() {
    let config = RuntimeConfig {
        alarm_clock_hour: 7,
        alarm_clock_minute: 30,
        alarm_clock_enabled: true,
        ..fast_config()
    };
    let mut rig = offline(config);
    rig.wall_clock = Some((7, 29));
    rig.pick(4);
    rig.run_for(500);
    assert_eq!(rig.app.mode(), Mode::Sleep);
    assert_eq!(rig.app.device().alarm, AlarmState::Armed);

    rig.wall_clock = Some((7, 30));
    rig.run_for(500);
    assert_eq!(rig.app.device().alarm, AlarmState::Triggered);

    rig.press(ButtonId::Back);
    assert_eq!(rig.app.device().alarm, AlarmState::Silenced);
    assert!(!rig.app.clock_alarm().enabled);
}

#[test]
fn leaving_alarm_modes_disarms() {
    let mut rig = offline(fast_config());
    rig.pick(3);
    assert_eq!(rig.app.device().alarm, AlarmState::Armed);
    rig.pick(1);
    assert_eq!(rig.app.device().alarm, AlarmState::Idle);
}
