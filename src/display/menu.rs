//! Page navigation.
//!
//! Pure function of (page, button event). Navigation only ever yields a new
//! page and, on Select of an actionable item, a [`MenuAction`] for the
//! state machine to decide on. It never changes the mode by itself.
//!
//! ```text
//!  HOME ──[Select]──▶ MENU ──[Select: mode item]──▶ HOME (+SelectMode)
//!   ▲                  │ │
//!   └────[Back]────────┘ ├──[Select: Set Alarm]──▶ ALARM_SET ──[Select×2]──▶ HOME (+SaveAlarm)
//!                        │                           └──[Back]──▶ MENU
//!                        └──[Select: Report Status]──▶ STATUS ──[Back/Select]──▶ HOME
//! ```

use crate::drivers::button::{ButtonEvent, ButtonId};
use crate::fsm::Mode;

/// Rows of the menu visible at once.
pub const VISIBLE_ITEMS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    AutoMode,
    Study,
    Relax,
    Away,
    Sleep,
    SetAlarm,
    ReportStatus,
}

impl MenuItem {
    pub const ALL: [MenuItem; 7] = [
        Self::AutoMode,
        Self::Study,
        Self::Relax,
        Self::Away,
        Self::Sleep,
        Self::SetAlarm,
        Self::ReportStatus,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::AutoMode => "Auto Mode",
            Self::Study => "Study",
            Self::Relax => "Relax",
            Self::Away => "Away",
            Self::Sleep => "Sleep",
            Self::SetAlarm => "Set Alarm",
            Self::ReportStatus => "Report Status",
        }
    }

    /// The mode a mode item selects.
    pub fn mode(self) -> Option<Mode> {
        match self {
            Self::AutoMode => Some(Mode::AutoMode),
            Self::Study => Some(Mode::Study),
            Self::Relax => Some(Mode::Relax),
            Self::Away => Some(Mode::Away),
            Self::Sleep => Some(Mode::Sleep),
            Self::SetAlarm | Self::ReportStatus => None,
        }
    }
}

const LAST_ITEM: u8 = MenuItem::ALL.len() as u8 - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPage {
    Home,
    /// `index` is the cursor, `top` the first visible row.
    Menu { index: u8, top: u8 },
    AlarmSet { hour: u8, minute: u8, editing_hour: bool },
    Status,
}

impl DisplayPage {
    pub fn menu_start() -> Self {
        Self::Menu { index: 0, top: 0 }
    }

    /// Item under the cursor.
    pub fn selected(self) -> Option<MenuItem> {
        match self {
            Self::Menu { index, .. } => MenuItem::ALL.get(usize::from(index)).copied(),
            _ => None,
        }
    }
}

/// Something a Select asks the state machine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    SelectMode(Mode),
    SaveAlarm { hour: u8, minute: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub page: DisplayPage,
    pub action: Option<MenuAction>,
}

impl Navigation {
    fn to(page: DisplayPage) -> Self {
        Self { page, action: None }
    }
}

/// Apply one button event to the page. `clock` seeds the alarm editor.
/// Releases are ignored.
pub fn navigate(page: DisplayPage, event: ButtonEvent, clock: (u8, u8)) -> Navigation {
    if !event.is_press() {
        return Navigation::to(page);
    }
    let button = event.id();
    // Repeat only scrolls.
    if matches!(event, ButtonEvent::Repeat(_)) && !button.repeats() {
        return Navigation::to(page);
    }

    match page {
        DisplayPage::Home => match button {
            ButtonId::Select => Navigation::to(DisplayPage::menu_start()),
            _ => Navigation::to(page),
        },
        DisplayPage::Menu { index, top } => match button {
            ButtonId::Up => {
                let index = index.saturating_sub(1);
                Navigation::to(DisplayPage::Menu {
                    index,
                    top: top.min(index),
                })
            }
            ButtonId::Down => {
                let index = (index + 1).min(LAST_ITEM);
                let top = if index >= top + VISIBLE_ITEMS {
                    index + 1 - VISIBLE_ITEMS
                } else {
                    top
                };
                Navigation::to(DisplayPage::Menu { index, top })
            }
            ButtonId::Back => Navigation::to(DisplayPage::Home),
            ButtonId::Select => select_item(page.selected(), clock),
        },
        DisplayPage::AlarmSet {
            hour,
            minute,
            editing_hour,
        } => match button {
            ButtonId::Up | ButtonId::Down => {
                let up = button == ButtonId::Up;
                let (hour, minute) = if editing_hour {
                    (step(hour, 24, up), minute)
                } else {
                    (hour, step(minute, 60, up))
                };
                Navigation::to(DisplayPage::AlarmSet {
                    hour,
                    minute,
                    editing_hour,
                })
            }
            ButtonId::Select if editing_hour => Navigation::to(DisplayPage::AlarmSet {
                hour,
                minute,
                editing_hour: false,
            }),
            ButtonId::Select => Navigation {
                page: DisplayPage::Home,
                action: Some(MenuAction::SaveAlarm { hour, minute }),
            },
            ButtonId::Back => Navigation::to(DisplayPage::Menu {
                index: MenuItem::SetAlarm as u8,
                top: MenuItem::SetAlarm as u8 + 1 - VISIBLE_ITEMS,
            }),
        },
        DisplayPage::Status => match button {
            ButtonId::Back | ButtonId::Select => Navigation::to(DisplayPage::Home),
            _ => Navigation::to(page),
        },
    }
}

fn select_item(item: Option<MenuItem>, clock: (u8, u8)) -> Navigation {
    match item {
        Some(MenuItem::SetAlarm) => Navigation::to(DisplayPage::AlarmSet {
            hour: clock.0,
            minute: clock.1,
            editing_hour: true,
        }),
        Some(MenuItem::ReportStatus) => Navigation::to(DisplayPage::Status),
        Some(item) => Navigation {
            page: DisplayPage::Home,
            action: item.mode().map(MenuAction::SelectMode),
        },
        None => Navigation::to(DisplayPage::Home),
    }
}

/// Wrapping increment or decrement in `0..modulo`.
fn step(value: u8, modulo: u8, up: bool) -> u8 {
    if up {
        (value + 1) % modulo
    } else {
        (value + modulo - 1) % modulo
    }
}
