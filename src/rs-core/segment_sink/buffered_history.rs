use std::{collections::VecDeque, rc::Rc};

use crate::{content::ChunkContext, utils::clock::Clock};

/// A range of time, in seconds, a segment was seen to occupy in a buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferedRange {
    pub start: f64,
    pub end: f64,
}

/// One buffering outcome of a segment.
#[derive(Clone, Debug)]
pub struct BufferedHistoryEntry {
    /// Monotonic timestamp, in milliseconds, at which that entry was added.
    pub date: f64,

    /// Range at which the segment was found in the buffer.
    ///
    /// `None` when the segment could never be found in it, which generally means that it has
    /// been garbage collected before we had a chance to measure it.
    pub buffered: Option<BufferedRange>,

    /// The segment concerned.
    pub context: ChunkContext,
}

/// Bounded log of where segments were seen in the buffer once pushed.
///
/// Looking at that history allows to detect segments which are regularly garbage collected or
/// pushed at unexpected positions, e.g. to avoid loading them again and again.
pub struct BufferedHistory {
    /// Entries, from the oldest to the newest.
    history: VecDeque<BufferedHistoryEntry>,

    /// Maximum age, in milliseconds, an entry may have before being evicted.
    retention_time: f64,

    /// Maximum number of entries kept.
    max_entries: usize,

    clock: Rc<dyn Clock>,
}

impl BufferedHistory {
    pub fn new(retention_time: f64, max_entries: usize, clock: Rc<dyn Clock>) -> Self {
        Self {
            history: VecDeque::new(),
            retention_time,
            max_entries,
            clock,
        }
    }

    /// Record a new buffering outcome for the segment described by `context`.
    ///
    /// Entries which are too old are evicted first, then the oldest ones until the maximum
    /// number of entries is respected.
    pub fn add_buffered_segment(
        &mut self,
        context: &ChunkContext,
        buffered: Option<BufferedRange>,
    ) {
        let now = self.clock.now_ms();
        self.history.push_back(BufferedHistoryEntry {
            date: now,
            buffered,
            context: context.clone(),
        });
        self.clean_history(now);
    }

    /// Returns every entry still in the history for the segment described by `context`, from the
    /// oldest to the newest.
    pub fn get_history_for(&self, context: &ChunkContext) -> Vec<&BufferedHistoryEntry> {
        self.history
            .iter()
            .filter(|entry| entry.context.is_same_content(context))
            .collect()
    }

    /// Returns the number of entries currently stored.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn clean_history(&mut self, now: f64) {
        let minimum_date = now - self.retention_time;
        while self
            .history
            .front()
            .map_or(false, |entry| entry.date < minimum_date)
        {
            self.history.pop_front();
        }
        while self.history.len() > self.max_entries {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::{test_utils::video_context, Representation, Segment},
        utils::clock::ManualClock,
    };

    fn context(segment_id: &str) -> ChunkContext {
        video_context(
            &Representation::new("r1", 1_000_000.),
            Segment::media(segment_id, 0., 2.),
        )
    }

    #[test]
    fn test_history_per_segment() {
        let clock = Rc::new(ManualClock::new(0.));
        let mut history = BufferedHistory::new(60_000., 10, clock.clone());
        history.add_buffered_segment(&context("s1"), Some(BufferedRange { start: 0., end: 2. }));
        clock.advance(100.);
        history.add_buffered_segment(&context("s2"), None);
        clock.advance(100.);
        history.add_buffered_segment(&context("s1"), None);

        let s1_history = history.get_history_for(&context("s1"));
        assert_eq!(s1_history.len(), 2);
        assert_eq!(s1_history[0].date, 0.);
        assert_eq!(
            s1_history[0].buffered,
            Some(BufferedRange { start: 0., end: 2. })
        );
        assert_eq!(s1_history[1].date, 200.);
        assert!(s1_history[1].buffered.is_none());
        assert_eq!(history.get_history_for(&context("s2")).len(), 1);
        assert!(history.get_history_for(&context("s3")).is_empty());
    }

    #[test]
    fn test_age_eviction() {
        let clock = Rc::new(ManualClock::new(0.));
        let mut history = BufferedHistory::new(1000., 10, clock.clone());
        history.add_buffered_segment(&context("s1"), None);
        clock.advance(600.);
        history.add_buffered_segment(&context("s2"), None);
        clock.advance(600.);
        history.add_buffered_segment(&context("s3"), None);
        assert_eq!(history.len(), 2);
        assert!(history.get_history_for(&context("s1")).is_empty());
        assert_eq!(history.get_history_for(&context("s2")).len(), 1);
    }

    #[test]
    fn test_count_eviction() {
        let clock = Rc::new(ManualClock::new(0.));
        let mut history = BufferedHistory::new(60_000., 3, clock.clone());
        for id in ["s1", "s2", "s3", "s4", "s5"] {
            history.add_buffered_segment(&context(id), None);
            clock.advance(10.);
        }
        assert_eq!(history.len(), 3);
        assert!(history.get_history_for(&context("s2")).is_empty());
        assert_eq!(history.get_history_for(&context("s3")).len(), 1);
        assert_eq!(history.get_history_for(&context("s5")).len(), 1);
    }
}
