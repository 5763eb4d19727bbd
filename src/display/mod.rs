//! Display renderer: turns a copy of the device state into four text rows
//! and redraws only the rows that changed since the last frame.
//!
//! The renderer reads state, it never writes it. Page changes come from
//! [`menu::navigate`] through the state machine like everything else.
//!
//! ```text
//!   DeviceState copy ──▶ compose() ──▶ [Row; 4] ──diff──▶ DisplayPort::draw_row
//!                                                          └──▶ flush
//! ```

pub mod menu;
pub mod oled;

use core::fmt::{self, Write as _};

use heapless::String;
use log::warn;

use crate::app::ports::{ConnectivityStatus, DisplayPort};
use crate::fsm::alarm::{AlarmState, ClockAlarm};
use crate::fsm::context::DeviceState;
use crate::sensors::window::{ChannelId, SensorSample};
use menu::{DisplayPage, MenuItem, VISIBLE_ITEMS};

/// Text rows on the panel (8 px font, 32 px tall).
pub const ROWS: usize = 4;
/// Characters per row (6 px font, 128 px wide).
pub const COLS: usize = 21;

pub type Row = String<COLS>;

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub device: DeviceState,
    pub connectivity: ConnectivityStatus,
    pub latest: Option<SensorSample>,
    pub wall_clock: Option<(u8, u8)>,
    pub alarm_clock: ClockAlarm,
    pub windows_sealed: u32,
    pub device_id: &'a str,
}

/// Format into a row, cutting anything past [`COLS`].
fn row(args: fmt::Arguments<'_>) -> Row {
    let mut wide: String<64> = String::new();
    let _ = wide.write_fmt(args);
    let mut out = Row::new();
    for c in wide.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// `left` padded so that `right` ends on the last column.
fn split_row(left: &str, right: &str) -> Row {
    let pad = COLS.saturating_sub(left.len() + right.len());
    row(format_args!("{left}{:pad$}{right}", ""))
}

fn clock_text(hm: Option<(u8, u8)>) -> String<5> {
    let mut s = String::new();
    let _ = match hm {
        Some((h, m)) => write!(s, "{h:02}:{m:02}"),
        None => s.push_str("--:--").map_err(|_| fmt::Error),
    };
    s
}

fn home(snap: &Snapshot<'_>) -> [Row; ROWS] {
    let d = &snap.device;
    let mut head: String<16> = String::new();
    let _ = write!(head, "{} [{}]", d.mode.label(), d.provenance.glyph());
    let top = split_row(&head, snap.connectivity.label());

    let readings = match snap.latest {
        Some(s) => {
            let lux = (s.value(ChannelId::Lux1) + s.value(ChannelId::Lux2)) / 2.0;
            let noise = (s.value(ChannelId::Noise1) + s.value(ChannelId::Noise2)) / 2.0;
            let motion = if s.value(ChannelId::Motion) > 0.5 { " M" } else { "" };
            row(format_args!("L:{lux:.0} N:{noise:.0}{motion}"))
        }
        None => row(format_args!("L:- N:-")),
    };

    let now = clock_text(snap.wall_clock);
    let alarm_line = if snap.alarm_clock.enabled {
        let at = clock_text(Some((snap.alarm_clock.hour, snap.alarm_clock.minute)));
        row(format_args!("{now}  ALM {at} {}", d.alarm.marker()))
    } else {
        row(format_args!("{now}  {}", d.alarm.marker()))
    };

    let bottom = match (d.alarm, d.stale) {
        (AlarmState::Triggered, _) => row(format_args!("ALARM! press any key")),
        (_, true) => row(format_args!("STALE: link down")),
        _ => Row::new(),
    };

    [top, readings, alarm_line, bottom]
}

fn menu_rows(index: u8, top: u8) -> [Row; ROWS] {
    let mut rows: [Row; ROWS] = Default::default();
    for (slot, out) in rows.iter_mut().take(usize::from(VISIBLE_ITEMS)).enumerate() {
        let i = usize::from(top) + slot;
        if let Some(item) = MenuItem::ALL.get(i) {
            let cursor = if i == usize::from(index) { '>' } else { ' ' };
            *out = row(format_args!("{cursor} {}", item.label()));
        }
    }
    rows[ROWS - 1] = row(format_args!("SEL=ok  BACK=home"));
    rows
}

fn alarm_set(hour: u8, minute: u8, editing_hour: bool) -> [Row; ROWS] {
    let field = if editing_hour {
        row(format_args!(">{hour:02}< : {minute:02}"))
    } else {
        row(format_args!(" {hour:02} : >{minute:02}<"))
    };
    [
        row(format_args!("Set Alarm")),
        field,
        row(format_args!("UP/DN change")),
        row(format_args!("SEL=next BACK=menu")),
    ]
}

fn status(snap: &Snapshot<'_>) -> [Row; ROWS] {
    [
        row(format_args!("{}", snap.connectivity)),
        row(format_args!("ID {}", snap.device_id)),
        row(format_args!("windows {}", snap.windows_sealed)),
        row(format_args!(
            "{} ({}){}",
            snap.device.mode,
            snap.device.provenance,
            if snap.device.stale { " stale" } else { "" }
        )),
    ]
}

/// Rows for the page the device is on. Pure.
pub fn compose(snap: &Snapshot<'_>) -> [Row; ROWS] {
    match snap.device.page {
        DisplayPage::Home => home(snap),
        DisplayPage::Menu { index, top } => menu_rows(index, top),
        DisplayPage::AlarmSet {
            hour,
            minute,
            editing_hour,
        } => alarm_set(hour, minute, editing_hour),
        DisplayPage::Status => status(snap),
    }
}

/// Partial-redraw renderer.
pub struct DisplayRenderer {
    shown: [Row; ROWS],
    /// Next render redraws every row.
    full: bool,
    frames: u32,
}

impl DisplayRenderer {
    pub fn new() -> Self {
        Self {
            shown: Default::default(),
            full: true,
            frames: 0,
        }
    }

    /// Draw the frame for `snap`, touching only rows whose text changed.
    /// Returns how many rows were redrawn. A failed push forces a full
    /// redraw next time.
    pub fn render(&mut self, snap: &Snapshot<'_>, port: &mut impl DisplayPort) -> usize {
        let rows = compose(snap);
        let mut drawn = 0;
        for (i, text) in rows.iter().enumerate() {
            if !self.full && self.shown[i] == *text {
                continue;
            }
            if let Err(e) = port.draw_row(i, text) {
                warn!("display: row {}: {}", i, e);
                self.full = true;
                return drawn;
            }
            self.shown[i] = text.clone();
            drawn += 1;
        }
        if drawn == 0 {
            return 0;
        }
        match port.flush() {
            Ok(()) => {
                self.full = false;
                self.frames = self.frames.wrapping_add(1);
            }
            Err(e) => {
                warn!("display: flush: {}", e);
                self.full = true;
            }
        }
        drawn
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

impl Default for DisplayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DisplayError;
    use crate::fsm::{Mode, Provenance};

    #[derive(Default)]
    struct RecordingPanel {
        draws: std::vec::Vec<(usize, std::string::String)>,
        flushes: u32,
        fail_flush: bool,
    }

    impl DisplayPort for RecordingPanel {
        fn draw_row(&mut self, row: usize, text: &str) -> Result<(), DisplayError> {
            self.draws.push((row, text.into()));
            Ok(())
        }

        fn flush(&mut self) -> Result<(), DisplayError> {
            self.flushes += 1;
            if self.fail_flush {
                Err(DisplayError::BusWriteFailed)
            } else {
                Ok(())
            }
        }
    }

    fn snap(device: DeviceState) -> Snapshot<'static> {
        Snapshot {
            device,
            connectivity: ConnectivityStatus::Connected,
            latest: None,
            wall_clock: Some((7, 5)),
            alarm_clock: ClockAlarm {
                hour: 8,
                minute: 0,
                enabled: false,
            },
            windows_sealed: 3,
            device_id: "AURA-A1B2C3",
        }
    }

    #[test]
    fn home_row_carries_mode_provenance_and_link() {
        let mut d = DeviceState::boot(Mode::Study);
        d.provenance = Provenance::Local;
        let rows = compose(&snap(d));
        assert!(rows[0].starts_with("STUDY [L]"));
        assert!(rows[0].ends_with("NET"));
        assert_eq!(rows[0].len(), COLS);
        assert!(rows[2].starts_with("07:05"));
    }

    #[test]
    fn stale_and_ringing_show_on_last_row() {
        let mut d = DeviceState::boot(Mode::Sleep);
        d.stale = true;
        assert!(compose(&snap(d))[3].starts_with("STALE"));
        d.alarm = AlarmState::Triggered;
        assert!(compose(&snap(d))[3].starts_with("ALARM!"));
    }

    #[test]
    fn menu_shows_cursor_on_selected_item() {
        let mut d = DeviceState::boot(Mode::AutoMode);
        d.page = DisplayPage::Menu { index: 3, top: 1 };
        let rows = compose(&snap(d));
        assert_eq!(rows[0].as_str(), "  Study");
        assert_eq!(rows[2].as_str(), "> Away");
    }

    #[test]
    fn alarm_editor_brackets_active_field() {
        let mut d = DeviceState::boot(Mode::AutoMode);
        d.page = DisplayPage::AlarmSet {
            hour: 6,
            minute: 30,
            editing_hour: false,
        };
        assert_eq!(compose(&snap(d))[1].as_str(), " 06 : >30<");
    }

    #[test]
    fn long_text_is_cut_to_width() {
        let r = row(format_args!("{}", "x".repeat(40)));
        assert_eq!(r.len(), COLS);
    }

    #[test]
    fn unchanged_frame_draws_nothing() {
        let mut panel = RecordingPanel::default();
        let mut renderer = DisplayRenderer::new();
        let s = snap(DeviceState::boot(Mode::Relax));
        assert_eq!(renderer.render(&s, &mut panel), ROWS);
        assert_eq!(renderer.render(&s, &mut panel), 0);
        assert_eq!(panel.flushes, 1);
    }

    #[test]
    fn only_changed_rows_are_redrawn() {
        let mut panel = RecordingPanel::default();
        let mut renderer = DisplayRenderer::new();
        let mut d = DeviceState::boot(Mode::Relax);
        renderer.render(&snap(d), &mut panel);
        panel.draws.clear();

        d.stale = true;
        assert_eq!(renderer.render(&snap(d), &mut panel), 1);
        assert_eq!(panel.draws[0].0, 3);
    }

    #[test]
    fn failed_flush_forces_full_redraw() {
        let mut panel = RecordingPanel {
            fail_flush: true,
            ..Default::default()
        };
        let mut renderer = DisplayRenderer::new();
        let s = snap(DeviceState::boot(Mode::Relax));
        renderer.render(&s, &mut panel);
        panel.fail_flush = false;
        assert_eq!(renderer.render(&s, &mut panel), ROWS);
        assert_eq!(renderer.frames(), 1);
    }
}
