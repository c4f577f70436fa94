use common::Segment;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// Consistent copy of the window contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    /// Sequence number of the oldest retained entry, `None` while empty.
    pub first_sequence: Option<u64>,
    pub segments: Vec<Segment>,
}

impl WindowSnapshot {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Entries paired with their sequence numbers, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &Segment)> + '_ {
        let first = self.first_sequence.unwrap_or_default();
        (first..).zip(self.segments.iter())
    }
}

#[derive(Debug)]
struct WindowState {
    entries: VecDeque<(u64, Segment)>,
    next_sequence: u64,
}

/// The most recent scheduling decisions, oldest evicted first.
///
/// Written by the driver only; any number of readers take snapshots.
#[derive(Debug)]
pub struct PlaybackWindow {
    capacity: usize,
    state: RwLock<WindowState>,
}

impl PlaybackWindow {
    /// Capacity is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: RwLock::new(WindowState {
                entries: VecDeque::with_capacity(capacity + 1),
                next_sequence: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a segment and return the sequence number it was given.
    pub fn append(&self, segment: Segment) -> u64 {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.entries.push_back((sequence, segment));
        while state.entries.len() > self.capacity {
            state.entries.pop_front();
        }
        sequence
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        WindowSnapshot {
            first_sequence: state.entries.front().map(|(sequence, _)| *sequence),
            segments: state.entries.iter().map(|(_, segment)| segment.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PlaybackWindow {
    fn default() -> Self {
        Self::new(10)
    }
}
