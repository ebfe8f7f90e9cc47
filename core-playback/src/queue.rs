//! # Play Queue
//!
//! Ordered list of upcoming and past videos with a cursor on the current one.
//!
//! The queue is owned by a single session. It never performs I/O; the session
//! learns about explicit navigation through the tap listener and publishes
//! content changes through change listeners.

use crate::models::QueueEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Called with the new current entry after an explicit navigation.
pub type QueueTapListener = Box<dyn Fn(&QueueEntry) + Send + Sync>;

/// Called after every content or cursor change.
pub type QueueChangeListener = Box<dyn Fn(&QueueSnapshot) + Send + Sync>;

/// Behavior when the current video ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Stop at the tail.
    #[default]
    Off,
    /// Replay the current video.
    One,
    /// Wrap to the head after the tail.
    All,
}

/// Point-in-time copy of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub entries: Vec<QueueEntry>,
    pub current_index: Option<usize>,
    pub repeat_mode: RepeatMode,
    pub playlist_id: Option<String>,
    pub channel_id: Option<String>,
}

impl QueueSnapshot {
    pub fn current(&self) -> Option<&QueueEntry> {
        self.current_index.and_then(|index| self.entries.get(index))
    }
}

/// The play queue.
///
/// The cursor is `Some` exactly when the queue has entries.
#[derive(Default)]
pub struct PlayQueue {
    entries: Vec<QueueEntry>,
    cursor: Option<usize>,
    repeat_mode: RepeatMode,
    wrap_navigation: bool,
    playlist_id: Option<String>,
    channel_id: Option<String>,
    tap_listener: Option<QueueTapListener>,
    change_listeners: Vec<QueueChangeListener>,
}

impl fmt::Debug for PlayQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayQueue")
            .field("len", &self.entries.len())
            .field("cursor", &self.cursor)
            .field("repeat_mode", &self.repeat_mode)
            .field("wrap_navigation", &self.wrap_navigation)
            .field("playlist_id", &self.playlist_id)
            .field("channel_id", &self.channel_id)
            .field("change_listeners", &self.change_listeners.len())
            .finish()
    }
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.cursor.and_then(|index| self.entries.get(index))
    }

    /// `true` when the cursor sits on the final entry.
    pub fn is_last(&self) -> bool {
        matches!(self.cursor, Some(index) if index + 1 == self.entries.len())
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.position_of(video_id).is_some()
    }

    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist_id.as_deref()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            entries: self.entries.clone(),
            current_index: self.cursor,
            repeat_mode: self.repeat_mode,
            playlist_id: self.playlist_id.clone(),
            channel_id: self.channel_id.clone(),
        }
    }

    fn position_of(&self, video_id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == video_id)
    }

    // ========================================================================
    // Settings & Listeners
    // ========================================================================

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        if self.repeat_mode != mode {
            self.repeat_mode = mode;
            self.notify_changed();
        }
    }

    /// Let `navigate_next`/`navigate_prev` wrap around the ends.
    pub fn set_wrap_navigation(&mut self, wrap: bool) {
        self.wrap_navigation = wrap;
    }

    /// Replace the tap listener; only the latest one is kept.
    pub fn set_on_queue_tap_listener<F>(&mut self, listener: F)
    where
        F: Fn(&QueueEntry) + Send + Sync + 'static,
    {
        self.tap_listener = Some(Box::new(listener));
    }

    pub fn add_queue_change_listener<F>(&mut self, listener: F)
    where
        F: Fn(&QueueSnapshot) + Send + Sync + 'static,
    {
        self.change_listeners.push(Box::new(listener));
    }

    fn notify_changed(&self) {
        if self.change_listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for listener in &self.change_listeners {
            listener(&snapshot);
        }
    }

    fn notify_tapped(&self) {
        if let (Some(listener), Some(entry)) = (&self.tap_listener, self.current()) {
            listener(entry);
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Forget everything, listeners and repeat mode included.
    pub fn reset_to_defaults(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.repeat_mode = RepeatMode::Off;
        self.playlist_id = None;
        self.channel_id = None;
        self.tap_listener = None;
        self.change_listeners.clear();
    }

    /// Drop all entries and the context; listeners survive.
    pub fn clear(&mut self) {
        let was_empty = self.entries.is_empty();
        self.entries.clear();
        self.cursor = None;
        self.playlist_id = None;
        self.channel_id = None;
        if !was_empty {
            self.notify_changed();
        }
    }

    /// Seed an empty queue with `current` followed by `related`.
    ///
    /// Duplicate ids keep their first occurrence. Returns `false` and leaves
    /// the queue untouched when it already has entries.
    pub fn update_queue(
        &mut self,
        current: QueueEntry,
        playlist_id: Option<String>,
        channel_id: Option<String>,
        related: Vec<QueueEntry>,
    ) -> bool {
        if !self.entries.is_empty() {
            return false;
        }

        let mut seen = HashSet::new();
        seen.insert(current.id.clone());
        self.entries.push(current);
        for entry in related {
            if seen.insert(entry.id.clone()) {
                self.entries.push(entry);
            }
        }

        self.cursor = Some(0);
        self.playlist_id = playlist_id;
        self.channel_id = channel_id;
        self.notify_changed();
        true
    }

    /// Append entries whose ids are not queued yet. Returns how many were added.
    pub fn insert_related_streams(&mut self, related: Vec<QueueEntry>) -> usize {
        let mut seen: HashSet<String> = self.entries.iter().map(|e| e.id.clone()).collect();
        let before = self.entries.len();
        for entry in related {
            if seen.insert(entry.id.clone()) {
                self.entries.push(entry);
            }
        }

        let added = self.entries.len() - before;
        if added > 0 {
            if self.cursor.is_none() {
                self.cursor = Some(0);
            }
            self.notify_changed();
        }
        added
    }

    /// Replace the entry with the same id and move the cursor onto it.
    pub fn update_current(&mut self, entry: QueueEntry) -> bool {
        let Some(index) = self.position_of(&entry.id) else {
            return false;
        };
        self.entries[index] = entry;
        self.cursor = Some(index);
        self.notify_changed();
        true
    }

    /// Id of the video that should play after the current one.
    ///
    /// Advances the cursor except under [`RepeatMode::One`].
    pub fn get_next(&mut self) -> Option<String> {
        let index = self.cursor?;

        if self.repeat_mode == RepeatMode::One {
            return self.current().map(|entry| entry.id.clone());
        }

        let next = if index + 1 < self.entries.len() {
            index + 1
        } else if self.repeat_mode == RepeatMode::All {
            0
        } else {
            return None;
        };

        self.cursor = Some(next);
        self.notify_changed();
        self.current().map(|entry| entry.id.clone())
    }

    /// Move to the following entry and fire the tap listener.
    pub fn navigate_next(&mut self) -> bool {
        let Some(index) = self.cursor else {
            return false;
        };
        let next = if index + 1 < self.entries.len() {
            index + 1
        } else if self.wrap_navigation {
            0
        } else {
            return false;
        };
        self.move_cursor(next)
    }

    /// Move to the preceding entry and fire the tap listener.
    pub fn navigate_prev(&mut self) -> bool {
        let Some(index) = self.cursor else {
            return false;
        };
        let prev = if index > 0 {
            index - 1
        } else if self.wrap_navigation {
            self.entries.len() - 1
        } else {
            return false;
        };
        self.move_cursor(prev)
    }

    /// Explicitly pick an entry, as a tap in a queue view would.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            return false;
        }
        self.cursor = Some(index);
        self.notify_changed();
        self.notify_tapped();
        true
    }

    fn move_cursor(&mut self, index: usize) -> bool {
        if self.cursor == Some(index) {
            return false;
        }
        self.cursor = Some(index);
        self.notify_changed();
        self.notify_tapped();
        true
    }
}
