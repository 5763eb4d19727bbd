//! Tick event queue.
//!
//! Events are produced by the cadence [`Scheduler`](crate::scheduler::Scheduler)
//! through its delegate, and consumed by the main loop, which folds
//! everything pending into one [`DueTicks`](crate::scheduler::DueTicks) set
//! per cycle.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Scheduler   │────▶│  Event Queue │────▶│  Main Loop   │
//! │ (delegate)  │     │  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

use crate::app::ports::TickKind;

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 32;

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// One producer (the scheduler delegate), one consumer (the main loop).
// Head and tail are atomics; slots are atomics too, so no `unsafe` is
// needed to share the buffer through a static.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
static EVENT_BUFFER: [AtomicU8; EVENT_QUEUE_CAP] = [const { AtomicU8::new(0) }; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(kind: TickKind) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false;
    }

    EVENT_BUFFER[head as usize].store(kind as u8, Ordering::Relaxed);
    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Returns `None` if the queue is empty.
pub fn pop_event() -> Option<TickKind> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None;
    }

    let raw = EVENT_BUFFER[tail as usize].load(Ordering::Relaxed);
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    kind_from_u8(raw)
}

/// Drain all pending events into a callback, in FIFO order.
pub fn drain_events(mut handler: impl FnMut(TickKind)) {
    while let Some(kind) = pop_event() {
        handler(kind);
    }
}

pub fn queue_is_empty() -> bool {
    EVENT_TAIL.load(Ordering::Relaxed) == EVENT_HEAD.load(Ordering::Acquire)
}

/// Number of pending events.
pub fn queue_len() -> usize {
    let head = EVENT_HEAD.load(Ordering::Relaxed) as usize;
    let tail = EVENT_TAIL.load(Ordering::Relaxed) as usize;
    (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
}

// ── Internal ──────────────────────────────────────────────────

fn kind_from_u8(raw: u8) -> Option<TickKind> {
    TickKind::ALL.get(usize::from(raw)).copied()
}
