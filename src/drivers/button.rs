//! Polled, per-line debounced button bank.
//!
//! ## Hardware
//!
//! Four active-low momentary switches with internal pull-ups. The lines
//! are sampled through `embedded-hal` [`InputPin`]s on every button poll
//! tick; there is no interrupt path.
//!
//! ## Debounce
//!
//! Each line keeps its own stable level and a candidate counter. A raw
//! level that differs from the stable one must repeat for `debounce_polls`
//! consecutive polls before it is accepted; any poll that agrees with the
//! stable level resets the candidate. One accepted change produces exactly
//! one event.
//!
//! | Transition          | Event               |
//! |---------------------|---------------------|
//! | released → pressed  | `Pressed(id)`       |
//! | pressed → released  | `Released(id)`      |
//! | held (Up/Down only) | `Repeat(id)`        |

use embedded_hal::digital::InputPin;
use heapless::Vec;

/// Physical buttons, in pin order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ButtonId {
    Up = 0,
    Down = 1,
    Select = 2,
    Back = 3,
}

impl ButtonId {
    pub const COUNT: usize = 4;
    pub const ALL: [ButtonId; Self::COUNT] = [Self::Up, Self::Down, Self::Select, Self::Back];

    /// Up and Down scroll, so holding them auto-repeats.
    pub const fn repeats(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

/// Confirmed button transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed(ButtonId),
    Released(ButtonId),
    /// Auto-repeat while an Up/Down button stays pressed.
    Repeat(ButtonId),
}

impl ButtonEvent {
    pub fn id(self) -> ButtonId {
        match self {
            Self::Pressed(id) | Self::Released(id) | Self::Repeat(id) => id,
        }
    }

    /// Pressed or Repeat: the events that drive navigation.
    pub fn is_press(self) -> bool {
        matches!(self, Self::Pressed(_) | Self::Repeat(_))
    }
}

/// Events one poll can produce: at most one per button.
pub type ButtonEvents = Vec<ButtonEvent, { ButtonId::COUNT }>;

/// Debounce state for one line.
#[derive(Debug, Clone, Copy, Default)]
struct LineState {
    stable: bool,
    candidate: bool,
    count: u8,
    held_polls: u16,
}

/// Auto-repeat timing, in polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatTiming {
    pub delay_polls: u16,
    pub rate_polls: u16,
}

pub struct ButtonBank {
    lines: [LineState; ButtonId::COUNT],
    debounce_polls: u8,
    repeat: Option<RepeatTiming>,
}

impl ButtonBank {
    /// `debounce_polls` of 0 is treated as 1.
    pub fn new(debounce_polls: u8) -> Self {
        Self {
            lines: [LineState::default(); ButtonId::COUNT],
            debounce_polls: debounce_polls.max(1),
            repeat: None,
        }
    }

    pub fn with_auto_repeat(mut self, timing: RepeatTiming) -> Self {
        self.repeat = Some(RepeatTiming {
            delay_polls: timing.delay_polls.max(1),
            rate_polls: timing.rate_polls.max(1),
        });
        self
    }

    /// Feed one raw sample per line (`true` = pressed) and collect the
    /// confirmed transitions.
    pub fn poll(&mut self, raw: [bool; ButtonId::COUNT]) -> ButtonEvents {
        let mut events = ButtonEvents::new();
        for (idx, level) in raw.into_iter().enumerate() {
            let id = ButtonId::ALL[idx];
            if let Some(ev) = self.poll_line(id, level) {
                // One event per line per poll; capacity equals line count.
                let _ = events.push(ev);
            }
        }
        events
    }

    fn poll_line(&mut self, id: ButtonId, level: bool) -> Option<ButtonEvent> {
        let line = &mut self.lines[id as usize];

        if level == line.stable {
            line.count = 0;
            if line.stable {
                line.held_polls = line.held_polls.saturating_add(1);
                return self.repeat_due(id);
            }
            return None;
        }

        if line.count > 0 && level == line.candidate {
            line.count = line.count.saturating_add(1);
        } else {
            line.candidate = level;
            line.count = 1;
        }

        if line.count < self.debounce_polls {
            return None;
        }

        line.stable = level;
        line.count = 0;
        line.held_polls = 0;
        Some(if level {
            ButtonEvent::Pressed(id)
        } else {
            ButtonEvent::Released(id)
        })
    }

    fn repeat_due(&mut self, id: ButtonId) -> Option<ButtonEvent> {
        let timing = self.repeat?;
        if !id.repeats() {
            return None;
        }
        let line = &mut self.lines[id as usize];
        // Fold the counter back one period so it never reaches saturation.
        if line.held_polls >= timing.delay_polls.saturating_add(timing.rate_polls) {
            line.held_polls = timing.delay_polls;
        }
        (line.held_polls == timing.delay_polls).then_some(ButtonEvent::Repeat(id))
    }

    /// Debounced level of one button.
    pub fn is_pressed(&self, id: ButtonId) -> bool {
        self.lines[id as usize].stable
    }
}

/// The four input pins, sampled as one raw frame.
pub struct ButtonLines<P: InputPin> {
    pins: [P; ButtonId::COUNT],
    read_errors: u32,
}

impl<P: InputPin> ButtonLines<P> {
    pub fn new(pins: [P; ButtonId::COUNT]) -> Self {
        Self {
            pins,
            read_errors: 0,
        }
    }

    /// Active-low: a line reading low is pressed. A pin that fails to read
    /// reports released.
    pub fn read_raw(&mut self) -> [bool; ButtonId::COUNT] {
        let mut raw = [false; ButtonId::COUNT];
        for (slot, pin) in raw.iter_mut().zip(self.pins.iter_mut()) {
            match pin.is_low() {
                Ok(low) => *slot = low,
                Err(_) => self.read_errors = self.read_errors.saturating_add(1),
            }
        }
        raw
    }

    pub fn read_errors(&self) -> u32 {
        self.read_errors
    }
}
