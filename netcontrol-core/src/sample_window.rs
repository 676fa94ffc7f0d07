use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Sliding window of cumulative counter readings.
///
/// A window sized for `n` intervals keeps `n + 1` readings; only the deltas
/// between consecutive readings carry meaning. Counters are monotonic, so a
/// reading lower than its predecessor contributes a zero delta instead of
/// wrapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleWindow {
    readings: VecDeque<u64>,
    capacity: usize,
}

impl SampleWindow {
    /// Creates an empty window covering `intervals` sampling intervals.
    pub fn new(intervals: usize) -> Self {
        let capacity = intervals.max(1) + 1;
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Builds a window from readings, oldest first. Extra readings beyond the
    /// capacity are dropped from the front.
    pub fn from_readings(intervals: usize, readings: impl IntoIterator<Item = u64>) -> Self {
        let mut window = Self::new(intervals);
        for reading in readings {
            window.push(reading);
        }
        window
    }

    pub fn push(&mut self, reading: u64) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// True once the window holds a full set of readings.
    pub fn is_valid(&self) -> bool {
        self.readings.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn intervals(&self) -> usize {
        self.capacity - 1
    }

    pub fn readings(&self) -> impl Iterator<Item = u64> + '_ {
        self.readings.iter().copied()
    }

    pub fn latest(&self) -> Option<u64> {
        self.readings.back().copied()
    }

    /// Sum of all consecutive deltas held by the window.
    pub fn delta(&self) -> u64 {
        self.readings
            .iter()
            .zip(self.readings.iter().skip(1))
            .map(|(older, newer)| newer.saturating_sub(*older))
            .sum()
    }

    /// Adds the growth of `other` slot by slot, aligned on the newest reading.
    ///
    /// Each slot receives how far `other` advanced since its own first
    /// reading, never its absolute value: two cumulative counters started at
    /// unrelated times, so only their increments can be moved between them.
    /// Slots older than `other`'s first reading receive nothing.
    pub fn add_window(&mut self, other: &SampleWindow) {
        self.apply_window(other, |slot, value| slot.saturating_add(value));
    }

    /// Subtracts `other` slot by slot, aligned like [`SampleWindow::add_window`].
    pub fn sub_window(&mut self, other: &SampleWindow) {
        self.apply_window(other, |slot, value| slot.saturating_sub(value));
    }

    fn apply_window(&mut self, other: &SampleWindow, op: impl Fn(u64, u64) -> u64) {
        let Some(first) = other.readings.front().copied() else {
            return;
        };
        let ours = self.readings.len();
        let theirs = other.readings.len();

        for (idx, slot) in self.readings.iter_mut().enumerate() {
            // distance from the newest reading
            let back = ours - 1 - idx;
            let value = if back < theirs {
                other.readings[theirs - 1 - back].saturating_sub(first)
            } else {
                0
            };
            *slot = op(*slot, value);
        }
    }
}
