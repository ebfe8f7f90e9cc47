//! # Segment Skip Engine
//!
//! Decides, for a playback position, whether a segment should be skipped,
//! muted or surfaced. Pure state machine; the session polls it and applies
//! the returned [`SegmentAction`] to the engine.

use crate::models::{SegmentActionKind, SegmentMarker};
use core_runtime::config::SkipMode;
use std::collections::BTreeMap;
use tracing::debug;

/// Consecutive automatic jumps allowed before the engine stops jumping.
pub const MAX_CHAIN_HOPS: u32 = 5;

/// What the session should do at the polled position.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentAction {
    /// Mute output until [`SegmentAction::MuteEnd`].
    MuteStart(SegmentMarker),
    /// Playback left the muted segment.
    MuteEnd,
    /// Seek to `target` seconds, skipping `segment`.
    JumpTo { target: f64, segment: SegmentMarker },
    /// Surface the segment to the user without acting on it.
    Highlight(SegmentMarker),
}

/// Evaluates segments against playback positions.
#[derive(Debug, Default)]
pub struct SegmentSkipEngine {
    segments: Vec<SegmentMarker>,
    categories: BTreeMap<String, SkipMode>,
    last_active: Option<usize>,
    muted: Option<usize>,
    chain_hops: u32,
    chain_exhausted: bool,
}

impl SegmentSkipEngine {
    pub fn new(categories: BTreeMap<String, SkipMode>) -> Self {
        Self {
            categories,
            ..Self::default()
        }
    }

    /// Replace the segments of the current video; dedupe state is cleared.
    pub fn set_segments(&mut self, mut segments: Vec<SegmentMarker>) {
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.segments = segments;
        self.clear_state();
    }

    pub fn set_categories(&mut self, categories: BTreeMap<String, SkipMode>) {
        self.categories = categories;
        self.clear_state();
    }

    pub fn segments(&self) -> &[SegmentMarker] {
        &self.segments
    }

    /// `true` while muting because of a segment.
    pub fn is_muting(&self) -> bool {
        self.muted.is_some()
    }

    /// Whether polling can produce any action at all.
    pub fn is_active(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| self.mode_of(segment) != SkipMode::Off)
    }

    /// Forget which segment fired last, after a new load or a user seek.
    ///
    /// Returns [`SegmentAction::MuteEnd`] when a mute was in progress.
    pub fn reset(&mut self) -> Option<SegmentAction> {
        let was_muting = self.muted.is_some();
        self.clear_state();
        was_muting.then_some(SegmentAction::MuteEnd)
    }

    /// Drop segments and state, e.g. when the session stops.
    pub fn clear(&mut self) -> Option<SegmentAction> {
        self.segments.clear();
        self.reset()
    }

    fn clear_state(&mut self) {
        self.last_active = None;
        self.muted = None;
        self.chain_hops = 0;
        self.chain_exhausted = false;
    }

    fn mode_of(&self, segment: &SegmentMarker) -> SkipMode {
        self.categories
            .get(&segment.category)
            .copied()
            .unwrap_or(SkipMode::Off)
    }

    fn active_at(&self, position: f64) -> Option<usize> {
        self.segments.iter().position(|segment| {
            segment.contains(position) && self.mode_of(segment) != SkipMode::Off
        })
    }

    /// Action for `position` (seconds), if any.
    ///
    /// A segment fires once until the position leaves it.
    pub fn evaluate(&mut self, position: f64) -> Option<SegmentAction> {
        if let Some(muted) = self.muted {
            let still_inside = self
                .segments
                .get(muted)
                .is_some_and(|segment| segment.contains(position));
            if !still_inside {
                self.muted = None;
                if self.last_active == Some(muted) {
                    self.last_active = None;
                }
                return Some(SegmentAction::MuteEnd);
            }
        }

        let Some(index) = self.active_at(position) else {
            self.last_active = None;
            self.chain_hops = 0;
            self.chain_exhausted = false;
            return None;
        };

        if self.last_active == Some(index) {
            return None;
        }
        self.last_active = Some(index);

        let segment = self.segments[index].clone();
        let mode = self.mode_of(&segment);

        match (segment.action, mode) {
            (SegmentActionKind::Skip, SkipMode::Automatic) => {
                if self.chain_exhausted {
                    return None;
                }
                self.chain_hops += 1;
                if self.chain_hops > MAX_CHAIN_HOPS {
                    debug!(
                        hops = self.chain_hops - 1,
                        category = %segment.category,
                        "Segment chain limit reached, not skipping"
                    );
                    self.chain_exhausted = true;
                    return None;
                }
                Some(SegmentAction::JumpTo {
                    target: segment.end,
                    segment,
                })
            }
            (SegmentActionKind::Mute, SkipMode::Automatic) => {
                self.muted = Some(index);
                Some(SegmentAction::MuteStart(segment))
            }
            _ => Some(SegmentAction::Highlight(segment)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(entries: &[(&str, SkipMode)]) -> BTreeMap<String, SkipMode> {
        entries
            .iter()
            .map(|(category, mode)| (category.to_string(), *mode))
            .collect()
    }

    fn skip(category: &str, start: f64, end: f64) -> SegmentMarker {
        SegmentMarker::new(category, start, end, SegmentActionKind::Skip)
    }

    #[test]
    fn test_automatic_skip_fires_once() {
        let mut engine = SegmentSkipEngine::new(categories(&[("sponsor", SkipMode::Automatic)]));
        engine.set_segments(vec![skip("sponsor", 10.0, 20.0)]);

        assert_eq!(engine.evaluate(5.0), None);
        assert!(matches!(
            engine.evaluate(12.0),
            Some(SegmentAction::JumpTo { target, .. }) if target == 20.0
        ));
        // Seek not applied yet
        assert_eq!(engine.evaluate(12.1), None);
        assert_eq!(engine.evaluate(20.0), None);
    }

    #[test]
    fn test_reentry_fires_again() {
        let mut engine = SegmentSkipEngine::new(categories(&[("sponsor", SkipMode::Automatic)]));
        engine.set_segments(vec![skip("sponsor", 10.0, 20.0)]);

        assert!(engine.evaluate(11.0).is_some());
        assert_eq!(engine.evaluate(25.0), None);
        assert!(engine.evaluate(11.0).is_some());
    }

    #[test]
    fn test_manual_and_off_modes() {
        let mut engine = SegmentSkipEngine::new(categories(&[
            ("intro", SkipMode::Manual),
            ("outro", SkipMode::Off),
        ]));
        engine.set_segments(vec![skip("intro", 0.0, 5.0), skip("outro", 50.0, 60.0)]);

        assert!(matches!(
            engine.evaluate(1.0),
            Some(SegmentAction::Highlight(ref s)) if s.category == "intro"
        ));
        assert_eq!(engine.evaluate(55.0), None);
        assert!(engine.is_active());
    }

    #[test]
    fn test_mute_start_and_end() {
        let mut engine =
            SegmentSkipEngine::new(categories(&[("music_offtopic", SkipMode::Automatic)]));
        engine.set_segments(vec![SegmentMarker::new(
            "music_offtopic",
            30.0,
            40.0,
            SegmentActionKind::Mute,
        )]);

        assert!(matches!(
            engine.evaluate(31.0),
            Some(SegmentAction::MuteStart(_))
        ));
        assert!(engine.is_muting());
        assert_eq!(engine.evaluate(35.0), None);
        assert_eq!(engine.evaluate(40.5), Some(SegmentAction::MuteEnd));
        assert!(!engine.is_muting());
        assert_eq!(engine.evaluate(41.0), None);
    }

    #[test]
    fn test_reset_ends_mute() {
        let mut engine =
            SegmentSkipEngine::new(categories(&[("music_offtopic", SkipMode::Automatic)]));
        engine.set_segments(vec![SegmentMarker::new(
            "music_offtopic",
            0.0,
            10.0,
            SegmentActionKind::Mute,
        )]);

        engine.evaluate(1.0);
        assert_eq!(engine.reset(), Some(SegmentAction::MuteEnd));
        assert_eq!(engine.reset(), None);
    }

    #[test]
    fn test_chain_jumps_are_bounded() {
        let mut engine = SegmentSkipEngine::new(categories(&[("sponsor", SkipMode::Automatic)]));
        let chain: Vec<_> = (0..8)
            .map(|i| skip("sponsor", i as f64 * 10.0, (i + 1) as f64 * 10.0))
            .collect();
        engine.set_segments(chain);

        let mut position = 0.0;
        let mut jumps = 0;
        while let Some(SegmentAction::JumpTo { target, .. }) = engine.evaluate(position) {
            jumps += 1;
            position = target;
        }
        assert_eq!(jumps, MAX_CHAIN_HOPS);

        // Playback continues through the rest of the chain untouched
        assert_eq!(engine.evaluate(position + 1.0), None);
        assert_eq!(engine.evaluate(70.0), None);

        // Leaving every segment re-arms jumping
        assert_eq!(engine.evaluate(90.0), None);
        assert!(matches!(
            engine.evaluate(5.0),
            Some(SegmentAction::JumpTo { .. })
        ));
    }

    #[test]
    fn test_segments_sorted_on_set() {
        let mut engine = SegmentSkipEngine::new(categories(&[("sponsor", SkipMode::Automatic)]));
        engine.set_segments(vec![skip("sponsor", 50.0, 60.0), skip("sponsor", 10.0, 20.0)]);

        let starts: Vec<f64> = engine.segments().iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![10.0, 50.0]);
    }

    #[test]
    fn test_inactive_without_enabled_segments() {
        let mut engine = SegmentSkipEngine::new(categories(&[("sponsor", SkipMode::Off)]));
        assert!(!engine.is_active());

        engine.set_segments(vec![skip("sponsor", 0.0, 10.0)]);
        assert!(!engine.is_active());

        engine.set_categories(categories(&[("sponsor", SkipMode::Automatic)]));
        assert!(engine.is_active());
        assert_eq!(engine.clear(), None);
        assert!(!engine.is_active());
    }
}
