//! Fixed-shape sensor windows.
//!
//! A [`WindowBuilder`] accumulates [`SensorSample`]s until it holds exactly
//! [`WINDOW_LEN`] of them, then seals them into a [`SensorWindow`] and starts
//! over empty. A `SensorWindow` can only exist complete: there is no way to
//! push into one or to build one with fewer rows.

use heapless::Vec;

/// Samples per window (T).
pub const WINDOW_LEN: usize = 30;
/// Channels per sample (C).
pub const CHANNELS: usize = 7;
/// `held` mask with every channel set.
pub const ALL_HELD: u8 = (1 << CHANNELS) - 1;

/// Channel layout of one sample row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelId {
    /// Right-hand light sensor (lux).
    Lux1 = 0,
    /// Left-hand light sensor (lux).
    Lux2 = 1,
    /// Left microphone RMS.
    Noise1 = 2,
    /// Right microphone RMS.
    Noise2 = 3,
    /// PIR line, 0.0 or 1.0.
    Motion = 4,
    /// `Lux1 - Lux2`
    LuxDiff = 5,
    /// `Noise1 - Noise2`
    NoiseDiff = 6,
}

impl ChannelId {
    pub const ALL: [ChannelId; CHANNELS] = [
        Self::Lux1,
        Self::Lux2,
        Self::Noise1,
        Self::Noise2,
        Self::Motion,
        Self::LuxDiff,
        Self::NoiseDiff,
    ];

    pub const fn mask(self) -> u8 {
        1 << (self as u8)
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

/// One reading per channel at one timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub values: [f32; CHANNELS],
    /// Bit `i` set when channel `i` repeats the last good value.
    pub held: u8,
}

impl SensorSample {
    pub const fn zeroed() -> Self {
        Self {
            values: [0.0; CHANNELS],
            held: 0,
        }
    }

    pub fn value(&self, ch: ChannelId) -> f32 {
        self.values[ch as usize]
    }

    pub fn is_held(&self, ch: ChannelId) -> bool {
        self.held & ch.mask() != 0
    }

    /// Every channel failed this tick.
    pub fn fully_held(&self) -> bool {
        self.held & ALL_HELD == ALL_HELD
    }
}

/// A sealed, immutable window of exactly [`WINDOW_LEN`] samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorWindow {
    sequence: u32,
    rows: [[f32; CHANNELS]; WINDOW_LEN],
    held: [u8; WINDOW_LEN],
}

impl SensorWindow {
    /// Build a window from complete rows, none of them held.
    pub fn from_rows(sequence: u32, rows: [[f32; CHANNELS]; WINDOW_LEN]) -> Self {
        Self {
            sequence,
            rows,
            held: [0; WINDOW_LEN],
        }
    }

    /// Position of this window in the sample stream, starting at 0.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The T×C matrix, oldest row first.
    pub fn rows(&self) -> &[[f32; CHANNELS]; WINDOW_LEN] {
        &self.rows
    }

    pub fn sample(&self, idx: usize) -> Option<SensorSample> {
        Some(SensorSample {
            values: *self.rows.get(idx)?,
            held: self.held[idx],
        })
    }

    /// Rows in which at least one channel was held.
    pub fn held_samples(&self) -> usize {
        self.held.iter().filter(|&&h| h != 0).count()
    }

    /// No channel produced a fresh reading anywhere in the window.
    pub fn fully_held(&self) -> bool {
        self.held.iter().all(|&h| h & ALL_HELD == ALL_HELD)
    }
}

/// The in-progress window. Owned exclusively by the windowing engine.
pub struct WindowBuilder {
    rows: Vec<SensorSample, WINDOW_LEN>,
    next_sequence: u32,
}

impl WindowBuilder {
    pub const fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_sequence: 0,
        }
    }

    /// Append one sample. Returns the sealed window when this sample
    /// completes it; the builder is empty again afterwards.
    pub fn push(&mut self, sample: SensorSample) -> Option<SensorWindow> {
        // Capacity is WINDOW_LEN and the builder is drained at WINDOW_LEN,
        // so there is always room here.
        let _ = self.rows.push(sample);
        if !self.rows.is_full() {
            return None;
        }

        let mut rows = [[0.0; CHANNELS]; WINDOW_LEN];
        let mut held = [0u8; WINDOW_LEN];
        for (i, s) in self.rows.iter().enumerate() {
            rows[i] = s.values;
            held[i] = s.held;
        }
        self.rows.clear();

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Some(SensorWindow {
            sequence,
            rows,
            held,
        })
    }

    /// Samples collected towards the current window.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Windows sealed so far.
    pub fn sealed(&self) -> u32 {
        self.next_sequence
    }
}

impl Default for WindowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: f32) -> SensorSample {
        SensorSample {
            values: [v; CHANNELS],
            held: 0,
        }
    }

    #[test]
    fn seals_on_the_thirtieth_sample() {
        let mut b = WindowBuilder::new();
        for i in 0..WINDOW_LEN - 1 {
            assert!(b.push(sample(i as f32)).is_none());
        }
        assert_eq!(b.len(), WINDOW_LEN - 1);
        let w = b.push(sample(99.0)).expect("window");
        assert_eq!(w.rows().len(), WINDOW_LEN);
        assert_eq!(w.rows()[0], [0.0; CHANNELS]);
        assert_eq!(w.rows()[WINDOW_LEN - 1], [99.0; CHANNELS]);
        assert!(b.is_empty());
    }

    #[test]
    fn sequence_numbers_follow_the_stream() {
        let mut b = WindowBuilder::new();
        let mut seqs = std::vec::Vec::new();
        for _ in 0..WINDOW_LEN * 3 {
            if let Some(w) = b.push(sample(1.0)) {
                seqs.push(w.sequence());
            }
        }
        assert_eq!(seqs, [0, 1, 2]);
        assert_eq!(b.sealed(), 3);
    }

    #[test]
    fn held_rows_are_counted() {
        let mut b = WindowBuilder::new();
        let mut w = None;
        for i in 0..WINDOW_LEN {
            let mut s = sample(0.0);
            if i % 10 == 0 {
                s.held = ChannelId::Motion.mask();
            }
            w = b.push(s);
        }
        let w = w.expect("window");
        assert_eq!(w.held_samples(), 3);
        assert!(!w.fully_held());
        assert!(w.sample(10).expect("row").is_held(ChannelId::Motion));
        assert!(w.sample(WINDOW_LEN).is_none());
    }

    #[test]
    fn fully_held_window_detected() {
        let mut b = WindowBuilder::new();
        let mut w = None;
        for _ in 0..WINDOW_LEN {
            let mut s = sample(0.0);
            s.held = ALL_HELD;
            w = b.push(s);
        }
        assert!(w.expect("window").fully_held());
    }

    #[test]
    fn channel_index_roundtrip() {
        for (i, ch) in ChannelId::ALL.iter().enumerate() {
            assert_eq!(*ch as usize, i);
            assert_eq!(ChannelId::from_index(i), Some(*ch));
        }
        assert_eq!(ChannelId::from_index(CHANNELS), None);
    }
}
