//! Incremental transcript assembly
//!
//! Consumes the ordered stream of partial and final transcription results
//! for one session and maintains a single coherent transcript: an
//! append-only list of finalized spans in session-absolute time, plus at
//! most one volatile in-progress tail.
//!
//! The assembler is owned by the render loop; when the network task needs
//! to feed it, both sides share it behind a single `Arc<Mutex<_>>`.

use crate::protocol::{TimedSegment, TranscriptPayload};
use tracing::debug;

/// Assembles partial/final transcription events into an ordered transcript
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    /// Finalized spans, re-based to session-absolute time. Append-only.
    finalized: Vec<TimedSegment>,
    /// Cumulative end time of all accepted windows, in seconds
    prefix: f64,
    /// Sequence of the most recently accepted final window
    last_sequence: u64,
    /// Text of the most recently accepted final window, for dedup
    last_final_text: Option<String>,
    /// The single in-progress window, replaced wholesale on each partial
    pending: Option<PendingPartial>,
}

#[derive(Debug, Clone)]
struct PendingPartial {
    sequence: u64,
    text: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a final transcription result for a completed window.
    ///
    /// Duplicates are discarded two ways: a sequence that is not greater
    /// than the last accepted one (retried or reordered event), and a text
    /// identical to the last accepted final's text. The speech service is
    /// non-deterministic, so the text comparison is a heuristic carried
    /// over from the product's observed behavior rather than a guaranteed
    /// dedup. Returns true if the window was accepted.
    pub fn apply_final(&mut self, sequence: u64, payload: &TranscriptPayload) -> bool {
        if sequence <= self.last_sequence {
            debug!(
                sequence,
                last = self.last_sequence,
                "discarding out-of-order final"
            );
            return false;
        }
        // A newer final supersedes the pending partial even when its own
        // text turns out to be a repeat and the window is discarded.
        self.pending = None;
        if self.last_final_text.as_deref() == Some(payload.text.as_str()) {
            debug!(sequence, "discarding final with unchanged text");
            return false;
        }

        let base = self.prefix;
        let mut window_end = 0.0_f64;
        for segment in &payload.segments {
            window_end = window_end.max(segment.end);
            self.finalized.push(segment.rebased(base));
        }
        self.prefix = base + window_end;
        self.last_sequence = sequence;
        self.last_final_text = Some(payload.text.clone());
        true
    }

    /// Apply a partial transcription result for the currently open window.
    ///
    /// A partial for an already-finalized window is ignored; a partial with
    /// text identical to the current pending one is a repeat and ignored;
    /// anything else replaces the pending window wholesale.
    pub fn apply_partial(&mut self, sequence: u64, payload: &TranscriptPayload) {
        if sequence <= self.last_sequence {
            debug!(sequence, "ignoring partial for finalized window");
            return;
        }
        if let Some(pending) = &self.pending {
            if pending.text == payload.text {
                return;
            }
        }
        self.pending = Some(PendingPartial {
            sequence,
            text: payload.text.clone(),
        });
    }

    /// Finalized spans in session-absolute time. Stable and growing.
    pub fn finalized_segments(&self) -> &[TimedSegment] {
        &self.finalized
    }

    /// Text of the in-progress window, if any. May shrink, change, or
    /// disappear at any point; it is never time-stamped.
    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.text.as_str())
    }

    /// Sequence number of the in-progress window, if any
    pub fn pending_sequence(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.sequence)
    }

    /// Full transcript text: finalized spans followed by the pending tail
    pub fn full_text(&self) -> String {
        let mut parts: Vec<&str> = self
            .finalized
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if let Some(pending) = self.pending_text() {
            let trimmed = pending.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed);
            }
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TimedSegment;

    fn payload(text: &str, spans: &[(f64, f64)]) -> TranscriptPayload {
        TranscriptPayload {
            text: text.to_string(),
            segments: spans
                .iter()
                .map(|&(start, end)| TimedSegment {
                    start,
                    end,
                    text: text.to_string(),
                    words: vec![],
                })
                .collect(),
            language: Some("en".to_string()),
        }
    }

    #[test]
    fn finals_grow_transcript_in_order() {
        let mut assembler = TranscriptAssembler::new();
        assert!(assembler.apply_final(8, &payload("first window", &[(0.0, 4.0), (4.0, 9.5)])));
        assert!(assembler.apply_final(16, &payload("second window", &[(0.0, 7.0)])));
        assert!(assembler.apply_final(24, &payload("third window", &[(0.5, 6.0)])));

        let segments = assembler.finalized_segments();
        assert_eq!(segments.len(), 4);
        // absolute start times never decrease across window boundaries
        for pair in segments.windows(2) {
            assert!(pair[1].start >= pair[0].start);
        }
    }

    #[test]
    fn duplicate_final_is_idempotent() {
        let mut assembler = TranscriptAssembler::new();
        let first = payload("hello there", &[(0.0, 10.0)]);
        assert!(assembler.apply_final(8, &first));
        let count = assembler.finalized_segments().len();
        let prefix_segment = assembler.finalized_segments()[0].clone();

        // same sequence, same text: must not double-append or double-advance
        assert!(!assembler.apply_final(8, &first));
        assert_eq!(assembler.finalized_segments().len(), count);
        assert_eq!(assembler.finalized_segments()[0], prefix_segment);

        // a later window still lands at the single-window offset
        assert!(assembler.apply_final(16, &payload("next", &[(0.0, 5.0)])));
        assert_eq!(assembler.finalized_segments()[1].start, 10.0);
    }

    #[test]
    fn unchanged_text_is_discarded() {
        let mut assembler = TranscriptAssembler::new();
        assert!(assembler.apply_final(8, &payload("same words", &[(0.0, 10.0)])));
        // the adapter re-emitted an unchanged result for the next window
        assert!(!assembler.apply_final(16, &payload("same words", &[(0.0, 10.0)])));
        assert_eq!(assembler.finalized_segments().len(), 1);
    }

    #[test]
    fn prefix_accumulates_across_windows() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply_final(8, &payload("a", &[(0.0, 10.0)]));
        // shorter second window: offset is still the cumulative 10, not 0
        assembler.apply_final(16, &payload("b", &[(1.0, 9.0)]));

        let segments = assembler.finalized_segments();
        assert_eq!(segments[1].start, 11.0);
        assert_eq!(segments[1].end, 19.0);

        assembler.apply_final(24, &payload("c", &[(0.0, 2.0)]));
        assert_eq!(assembler.finalized_segments()[2].start, 19.0);
    }

    #[test]
    fn partial_after_final_is_a_no_op() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply_final(8, &payload("done", &[(0.0, 10.0)]));
        let before = assembler.finalized_segments().to_vec();

        assembler.apply_partial(8, &payload("stale partial", &[]));
        assert_eq!(assembler.finalized_segments(), before.as_slice());
        assert_eq!(assembler.pending_text(), None);
    }

    #[test]
    fn pending_reflects_latest_partial_only() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply_partial(1, &payload("he", &[]));
        assembler.apply_partial(2, &payload("hello wo", &[]));
        assert_eq!(assembler.pending_text(), Some("hello wo"));

        // repeated text is a no-op
        assembler.apply_partial(3, &payload("hello wo", &[]));
        assert_eq!(assembler.pending_sequence(), Some(2));

        assembler.apply_partial(4, &payload("hello world", &[]));
        assert_eq!(assembler.pending_text(), Some("hello world"));
    }

    #[test]
    fn final_clears_pending() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply_partial(7, &payload("in progress", &[]));
        assembler.apply_final(8, &payload("in progress, finalized", &[(0.0, 10.0)]));
        assert_eq!(assembler.pending_text(), None);
        assert_eq!(assembler.full_text(), "in progress, finalized");
    }

    #[test]
    fn text_deduped_final_still_clears_pending() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply_final(8, &payload("same words", &[(0.0, 10.0)]));
        assembler.apply_partial(15, &payload("tail of the next window", &[]));

        // the next window's final repeats the text and is discarded, but
        // the partial it supersedes must not linger
        assert!(!assembler.apply_final(16, &payload("same words", &[(0.0, 10.0)])));
        assert_eq!(assembler.pending_text(), None);
        assert_eq!(assembler.full_text(), "same words");
    }

    #[test]
    fn full_text_includes_pending_tail() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply_final(8, &payload("first window.", &[(0.0, 10.0)]));
        assembler.apply_partial(9, &payload("and then", &[]));
        assert_eq!(assembler.full_text(), "first window. and then");
    }
}
