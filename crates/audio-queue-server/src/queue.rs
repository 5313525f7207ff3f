//! Session queue: pending entries, bounded history, and loop policy.
//!
//! `pending[0]` is always the current (or about-to-play) entry. Mutations that
//! take a position refuse to touch it.

use std::collections::VecDeque;

use audio_queue_types::{LoopMode, labels};
use rand::seq::SliceRandom;

use crate::descriptor::{DescriptorId, SharedDescriptor};

pub const DEFAULT_MAX_HISTORY: usize = 10;
pub const DEFAULT_MAX_TITLE_HISTORY: usize = 15;

/// Rejected position for a queue mutation. The queue is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("{}", labels::NEGATIVE_INDEX)]
    NegativeIndex,
    #[error("{}", labels::ZERO_INDEX)]
    ZeroIndex,
    #[error("{}", labels::MISSING_INDEX)]
    OutOfRange,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueLimits {
    pub max_history: usize,
    pub max_title_history: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            max_title_history: DEFAULT_MAX_TITLE_HISTORY,
        }
    }
}

/// Point-in-time view of a queue, taken under the session lock.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<SharedDescriptor>,
    pub upcoming: Vec<SharedDescriptor>,
    pub total: usize,
    pub loop_mode: LoopMode,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Default)]
pub struct Queue {
    pending: VecDeque<SharedDescriptor>,
    /// Previously played entries (oldest -> newest).
    history: VecDeque<SharedDescriptor>,
    /// Titles of finished entries, kept after the descriptors are gone.
    title_history: VecDeque<String>,
    loop_mode: LoopMode,
    limits: QueueLimits,
}

impl Queue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    /// Current entry, if any.
    pub fn head(&self) -> Option<SharedDescriptor> {
        self.pending.front().cloned()
    }

    /// Up to `limit` entries queued after the current one.
    pub fn upcoming(&self, limit: usize) -> Vec<SharedDescriptor> {
        self.pending.iter().skip(1).take(limit).cloned().collect()
    }

    pub fn snapshot(&self, limit: usize) -> QueueSnapshot {
        QueueSnapshot {
            current: self.head(),
            upcoming: self.upcoming(limit),
            total: self.pending.len(),
            loop_mode: self.loop_mode,
            has_next: self.has_next(),
            has_prev: self.has_prev(),
        }
    }

    pub fn title_history(&self) -> impl Iterator<Item = &str> {
        self.title_history.iter().map(String::as_str)
    }

    pub fn add(&mut self, descriptor: SharedDescriptor) {
        self.pending.push_back(descriptor);
    }

    pub fn record_title(&mut self, title: impl Into<String>) {
        self.title_history.push_back(title.into());
        while self.title_history.len() > self.limits.max_title_history {
            self.title_history.pop_front();
        }
    }

    pub fn has_next(&self) -> bool {
        let needed = if self.loop_mode == LoopMode::All { 1 } else { 2 };
        self.pending.len() >= needed
    }

    pub fn has_prev(&self) -> bool {
        if self.loop_mode == LoopMode::All {
            !self.pending.is_empty()
        } else {
            !self.history.is_empty()
        }
    }

    /// Move to the next entry and return the new head.
    ///
    /// A natural end (`ignore_single_loop = false`) keeps the head in
    /// single-loop mode; a forced skip always moves on.
    pub fn advance(&mut self, ignore_single_loop: bool) -> Option<SharedDescriptor> {
        if self.pending.is_empty() {
            return None;
        }
        match self.loop_mode {
            LoopMode::Off => self.pop_into_history(),
            LoopMode::Single if ignore_single_loop => self.pop_into_history(),
            LoopMode::Single => self.head(),
            LoopMode::All => {
                self.pending.rotate_left(1);
                self.head()
            }
        }
    }

    /// Step back one entry and return the new head.
    pub fn rewind(&mut self) -> Option<SharedDescriptor> {
        if self.loop_mode != LoopMode::All {
            let previous = self.history.pop_back()?;
            self.pending.push_front(previous.clone());
            return Some(previous);
        }
        if self.pending.is_empty() {
            return None;
        }
        self.pending.rotate_right(1);
        self.head()
    }

    /// Randomly reorder everything after the current entry.
    pub fn shuffle(&mut self) {
        if self.pending.len() < 3 {
            return;
        }
        let mut rng = rand::rng();
        self.pending.make_contiguous()[1..].shuffle(&mut rng);
    }

    /// Drop upcoming entries, keeping the current one.
    pub fn clear(&mut self) {
        self.pending.truncate(1);
    }

    /// Drop everything, history included.
    pub fn empty(&mut self) {
        self.pending.clear();
        self.history.clear();
    }

    pub fn remove(&mut self, index: i64) -> Result<SharedDescriptor, QueueError> {
        let index = self.check_index(index)?;
        self.pending.remove(index).ok_or(QueueError::OutOfRange)
    }

    /// Move the entry at `from` so it ends up at position `to`.
    pub fn move_item(&mut self, from: i64, to: i64) -> Result<SharedDescriptor, QueueError> {
        let from = self.check_index(from)?;
        let to = self.check_index(to)?;
        let item = self.pending.remove(from).ok_or(QueueError::OutOfRange)?;
        self.pending.insert(to, item.clone());
        Ok(item)
    }

    /// Remove a specific descriptor wherever it currently sits (never the head).
    ///
    /// Returns `false` when it is no longer queued behind the head.
    pub fn remove_descriptor(&mut self, id: DescriptorId) -> bool {
        let Some(pos) = self.pending.iter().skip(1).position(|d| d.id() == id) else {
            return false;
        };
        self.pending.remove(pos + 1).is_some()
    }

    fn check_index(&self, index: i64) -> Result<usize, QueueError> {
        if index < 0 {
            return Err(QueueError::NegativeIndex);
        }
        if index == 0 {
            return Err(QueueError::ZeroIndex);
        }
        let index = usize::try_from(index).map_err(|_| QueueError::OutOfRange)?;
        if index >= self.pending.len() {
            return Err(QueueError::OutOfRange);
        }
        Ok(index)
    }

    fn pop_into_history(&mut self) -> Option<SharedDescriptor> {
        if let Some(played) = self.pending.pop_front() {
            self.history.push_back(played);
            while self.history.len() > self.limits.max_history {
                self.history.pop_front();
            }
        }
        self.head()
    }
}
