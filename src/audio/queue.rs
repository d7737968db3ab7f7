use chrono::{DateTime, Utc};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::sources::PlayableTrack;

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub track: PlayableTrack,
    /// Enqueue order, unique within one queue
    pub seq: u64,
    pub added_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn title(&self) -> &str {
        self.track.title()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Track,
}

/// Pending tracks plus the one bound to the sink.
///
/// Pure bookkeeping: it never talks to the sink, the session decides when to
/// call what. `current` is never also in `items`.
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueEntry>,
    current: Option<QueueEntry>,
    loop_mode: LoopMode,
    next_seq: u64,
}

impl Default for MusicQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            loop_mode: LoopMode::Off,
            next_seq: 0,
        }
    }

    /// Appends a track, returning its 1-based position among pending tracks
    pub fn push(&mut self, track: PlayableTrack) -> usize {
        let entry = QueueEntry {
            track,
            seq: self.next_seq,
            added_at: Utc::now(),
        };
        self.next_seq += 1;

        info!("➕ Added to queue: {}", entry.title());
        self.items.push_back(entry);
        self.items.len()
    }

    /// Retires the current entry after its playback ended.
    ///
    /// With [`LoopMode::Track`] and a natural end the entry goes back to the
    /// head of the queue; otherwise it is dropped and returned.
    pub fn retire_current(&mut self, natural_end: bool) -> Option<QueueEntry> {
        let finished = self.current.take()?;

        if natural_end && self.loop_mode == LoopMode::Track {
            info!("🔂 Repeating track: {}", finished.title());
            self.items.push_front(finished);
            None
        } else {
            debug!("⏏️ Retired: {}", finished.title());
            Some(finished)
        }
    }

    /// Moves the head of the queue into the current slot (strict FIFO).
    ///
    /// Any entry still in the current slot is dropped first.
    pub fn promote_next(&mut self) -> Option<&QueueEntry> {
        self.current = self.items.pop_front();
        self.current.as_ref()
    }

    pub fn discard_current(&mut self) -> Option<QueueEntry> {
        self.current.take()
    }

    pub fn clear(&mut self) {
        let cleared = self.items.len();
        self.items.clear();
        self.current = None;
        info!("🗑️ Queue cleared: {} pending tracks removed", cleared);
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.loop_mode = match self.loop_mode {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Off,
        };
        match self.loop_mode {
            LoopMode::Off => info!("➡️ Repeat disabled"),
            LoopMode::Track => info!("🔂 Repeat track enabled"),
        }
        self.loop_mode == LoopMode::Track
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn titles(&self) -> Vec<String> {
        self.items.iter().map(|e| e.title().to_string()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.items.iter()
    }

    /// Known duration of pending tracks plus the current one
    pub fn total_duration(&self) -> Duration {
        self.items
            .iter()
            .chain(self.current.iter())
            .filter_map(|e| e.track.duration())
            .sum()
    }

    /// True when the current entry does not also sit in the pending queue
    pub fn is_consistent(&self) -> bool {
        match &self.current {
            Some(current) => self.items.iter().all(|e| e.seq != current.seq),
            None => true,
        }
    }
}
