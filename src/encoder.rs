//! Segment encoder: rotates the capture stream into numbered segments
//!
//! Slices the continuous chunk stream from the capture module into
//! fixed-duration segments. With a window of `W` seconds and a fan-out of
//! `N`, a new segment starts every `W/N` seconds and every `N`th segment
//! closes a window (`is_final`). Rotation is driven by the audio clock
//! (accumulated sample counts) rather than a wall-clock timer, so no audio
//! is lost between one segment closing and the next opening.

use crate::audio::AudioChunk;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Events emitted by the encoder, in emission order
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    /// Raw audio for the in-flight segment
    Chunk { sequence: u64, bytes: Vec<u8> },
    /// The segment rotated out; its audio is complete
    SegmentDone {
        sequence: u64,
        is_final: bool,
        window_size: u32,
    },
}

/// A completed rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBoundary {
    pub sequence: u64,
    pub is_final: bool,
    pub window_size: u32,
}

/// Tracks the in-flight segment against the audio clock
///
/// Sequences start at 1 and `is_final` is true exactly when the sequence
/// is a multiple of the window fan-out.
#[derive(Debug)]
pub struct SegmentClock {
    sequence: u64,
    window_fanout: u32,
    /// Samples per segment slice (W/N seconds of audio)
    slice_samples: u64,
    /// Samples accumulated into the in-flight segment
    buffered: u64,
}

impl SegmentClock {
    pub fn new(window_secs: u32, window_fanout: u32, sample_rate: u32) -> Self {
        let window_samples = u64::from(sample_rate) * u64::from(window_secs);
        Self {
            sequence: 1,
            window_fanout,
            slice_samples: (window_samples / u64::from(window_fanout)).max(1),
            buffered: 0,
        }
    }

    /// Sequence number of the in-flight segment
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Account for `samples` of captured audio; returns the boundaries of
    /// any segments that completed, oldest first.
    pub fn advance(&mut self, samples: u64) -> Vec<SegmentBoundary> {
        self.buffered += samples;
        let mut boundaries = Vec::new();
        while self.buffered >= self.slice_samples {
            self.buffered -= self.slice_samples;
            boundaries.push(self.rotate());
        }
        boundaries
    }

    /// Close out the in-flight segment on stop, if it holds any audio
    pub fn flush(&mut self) -> Option<SegmentBoundary> {
        if self.buffered == 0 {
            return None;
        }
        self.buffered = 0;
        Some(self.rotate())
    }

    fn rotate(&mut self) -> SegmentBoundary {
        let boundary = SegmentBoundary {
            sequence: self.sequence,
            is_final: self.sequence % u64::from(self.window_fanout) == 0,
            window_size: self.window_fanout,
        };
        self.sequence += 1;
        boundary
    }
}

/// Spawn the segmenter task: consumes capture chunks, emits encoder
/// events. The event stream ends after the stop flush; nothing is emitted
/// once the capture channel closes and the trailing boundary has been
/// delivered.
pub fn spawn_segmenter(
    mut audio_rx: mpsc::Receiver<AudioChunk>,
    window_secs: u32,
    window_fanout: u32,
    sample_rate: u32,
) -> mpsc::Receiver<EncoderEvent> {
    let (event_tx, event_rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut clock = SegmentClock::new(window_secs, window_fanout, sample_rate);

        while let Some(chunk) = audio_rx.recv().await {
            let sequence = clock.sequence();
            let event = EncoderEvent::Chunk {
                sequence,
                bytes: chunk.to_bytes(),
            };
            if event_tx.send(event).await.is_err() {
                return;
            }

            for boundary in clock.advance(chunk.samples.len() as u64) {
                debug!(
                    sequence = boundary.sequence,
                    is_final = boundary.is_final,
                    "segment rotated"
                );
                if send_boundary(&event_tx, boundary).await.is_err() {
                    return;
                }
            }
        }

        // Capture stopped: flush whatever is in flight
        if let Some(boundary) = clock.flush() {
            let _ = send_boundary(&event_tx, boundary).await;
        }
        info!("segmenter finished");
    });

    event_rx
}

async fn send_boundary(
    event_tx: &mpsc::Sender<EncoderEvent>,
    boundary: SegmentBoundary,
) -> Result<(), mpsc::error::SendError<EncoderEvent>> {
    event_tx
        .send(EncoderEvent::SegmentDone {
            sequence: boundary.sequence,
            is_final: boundary.is_final,
            window_size: boundary.window_size,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TARGET_SAMPLE_RATE;

    #[test]
    fn sequences_start_at_one_and_finalize_on_fanout_multiples() {
        let mut clock = SegmentClock::new(10, 8, TARGET_SAMPLE_RATE);
        let slice = u64::from(TARGET_SAMPLE_RATE) * 10 / 8;

        let mut seen = Vec::new();
        for _ in 0..16 {
            seen.extend(clock.advance(slice));
        }

        assert_eq!(seen.len(), 16);
        assert_eq!(seen[0].sequence, 1);
        assert!(!seen[0].is_final);
        assert!(seen[7].is_final);
        assert!(!seen[8].is_final);
        assert!(seen[15].is_final);
        assert!(seen.iter().all(|b| b.window_size == 8));
    }

    #[test]
    fn rotation_happens_only_at_the_sample_budget() {
        let mut clock = SegmentClock::new(10, 8, TARGET_SAMPLE_RATE);
        let slice = u64::from(TARGET_SAMPLE_RATE) * 10 / 8;

        assert!(clock.advance(slice - 1).is_empty());
        let boundaries = clock.advance(1);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].sequence, 1);
        assert_eq!(clock.sequence(), 2);
    }

    #[test]
    fn one_large_burst_can_close_several_segments() {
        let mut clock = SegmentClock::new(10, 8, TARGET_SAMPLE_RATE);
        let slice = u64::from(TARGET_SAMPLE_RATE) * 10 / 8;

        let boundaries = clock.advance(slice * 3 + 5);
        assert_eq!(boundaries.len(), 3);
        assert_eq!(
            boundaries.iter().map(|b| b.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn flush_emits_the_trailing_segment_once() {
        let mut clock = SegmentClock::new(10, 8, TARGET_SAMPLE_RATE);
        clock.advance(100);

        let boundary = clock.flush().expect("in-flight audio flushes");
        assert_eq!(boundary.sequence, 1);
        assert!(clock.flush().is_none());
    }

    #[test]
    fn flush_without_audio_is_silent() {
        let mut clock = SegmentClock::new(10, 8, TARGET_SAMPLE_RATE);
        assert!(clock.flush().is_none());
    }

    #[tokio::test]
    async fn segmenter_tags_chunks_and_emits_boundaries_in_order() {
        let (audio_tx, audio_rx) = mpsc::channel(16);
        // 1-second window, fan-out 2: a slice is half a second of audio
        let mut events = spawn_segmenter(audio_rx, 1, 2, TARGET_SAMPLE_RATE);

        let half_second = AudioChunk {
            samples: vec![0i16; TARGET_SAMPLE_RATE as usize / 2],
            sample_rate: TARGET_SAMPLE_RATE,
        };
        audio_tx.send(half_second.clone()).await.unwrap();
        audio_tx.send(half_second).await.unwrap();
        // a trailing sliver, then stop
        audio_tx
            .send(AudioChunk {
                samples: vec![0i16; 10],
                sample_rate: TARGET_SAMPLE_RATE,
            })
            .await
            .unwrap();
        drop(audio_tx);

        let mut log = Vec::new();
        while let Some(event) = events.recv().await {
            log.push(match event {
                EncoderEvent::Chunk { sequence, .. } => format!("chunk {}", sequence),
                EncoderEvent::SegmentDone {
                    sequence, is_final, ..
                } => format!("done {} {}", sequence, is_final),
            });
        }

        assert_eq!(
            log,
            vec![
                "chunk 1",
                "done 1 false",
                "chunk 2",
                "done 2 true",
                "chunk 3",
                // stop flushed the in-flight third segment
                "done 3 false",
            ]
        );
    }
}
