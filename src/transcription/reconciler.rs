//! Transcript reconciliation.
//!
//! Collects transcribed segments in arrival order and merges spans that are
//! adjacent on the audio timeline, so overlapping windows from the two
//! buffer managers read as one transcript.

use crate::defaults;
use crate::transcription::types::TextSegment;
use std::sync::Mutex;
use std::time::Duration;

/// Timestamp-ordered transcript accumulator.
pub struct TextReconciler {
    segments: Mutex<Vec<TextSegment>>,
    merge_gap: Duration,
}

impl Default for TextReconciler {
    fn default() -> Self {
        Self::new(Duration::from_millis(defaults::MERGE_GAP_MS))
    }
}

impl TextReconciler {
    /// Create a reconciler merging segments separated by at most `merge_gap`.
    pub fn new(merge_gap: Duration) -> Self {
        Self {
            segments: Mutex::new(Vec::new()),
            merge_gap,
        }
    }

    /// Add a transcribed span.
    ///
    /// Whitespace is trimmed and empty results dropped. Segments are kept in
    /// timeline order regardless of arrival order; a span starting within
    /// `merge_gap` of its neighbor's end (overlap counts as a zero gap) is
    /// merged into one segment.
    pub fn add_segment(&self, start: Duration, end: Duration, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let mut segments = self.lock();
        let idx = segments.partition_point(|s| s.start <= start);

        if idx > 0 && self.touches(&segments[idx - 1], start) {
            let prev = &mut segments[idx - 1];
            prev.text.push(' ');
            prev.text.push_str(text);
            prev.end = prev.end.max(end);
            self.coalesce_forward(&mut segments, idx - 1);
            return;
        }

        segments.insert(
            idx,
            TextSegment {
                text: text.to_string(),
                start,
                end,
            },
        );
        self.coalesce_forward(&mut segments, idx);
    }

    fn touches(&self, prev: &TextSegment, start: Duration) -> bool {
        start <= prev.end || start.saturating_sub(prev.end) <= self.merge_gap
    }

    /// Merge the segment at `idx` with any successors it now reaches.
    fn coalesce_forward(&self, segments: &mut Vec<TextSegment>, idx: usize) {
        while idx + 1 < segments.len() && self.touches(&segments[idx], segments[idx + 1].start) {
            let next = segments.remove(idx + 1);
            let current = &mut segments[idx];
            current.text.push(' ');
            current.text.push_str(&next.text);
            current.end = current.end.max(next.end);
        }
    }

    /// Join all segment texts with single spaces and drain the list.
    pub fn take_combined_text(&self) -> String {
        let mut segments = self.lock();
        let combined = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        segments.clear();
        combined
    }

    /// Remove segments overlapping the window `[start, end)`.
    ///
    /// A segment survives when it ends at or before `start`, or starts at or
    /// after `end`.
    pub fn erase_in_window(&self, start: Duration, end: Duration) {
        self.lock().retain(|s| s.end <= start || s.start >= end);
    }

    /// Number of pending segments.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard all segments.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TextSegment>> {
        self.segments.lock().unwrap_or_else(|e| e.into_inner())
    }
}
