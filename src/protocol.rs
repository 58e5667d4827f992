//! Wire protocol between the recording client and the relay
//!
//! All frames are JSON text messages. Raw audio travels base64-encoded
//! inside `stream_audio` frames so a single tagged enum covers the whole
//! contract in both directions.

use serde::{Deserialize, Serialize};

/// Messages sent from the recording client to the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Declares the session's user id. Must precede any audio frames.
    Uid { uid: String },
    /// One raw audio chunk, tagged with the in-flight segment sequence
    StreamAudio {
        /// Base64-encoded PCM16 audio
        blob: String,
        sequence: u64,
    },
    /// Segment boundary signal emitted after a rotation completes
    DoneWithSegment {
        sequence: u64,
        is_final: bool,
        window_size: u32,
    },
}

/// Messages sent from the relay back to the recording client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Fast, low-accuracy transcription of the currently open window
    TinyData {
        sequence: u64,
        #[serde(flatten)]
        payload: TranscriptPayload,
    },
    /// Authoritative transcription of a fully closed window
    CompleteData {
        sequence: u64,
        #[serde(flatten)]
        payload: TranscriptPayload,
    },
    /// Protocol violation report. The session continues.
    Error { message: String },
}

/// Transcription result as returned by the speech service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptPayload {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TimedSegment>,
    #[serde(default)]
    pub language: Option<String>,
}

/// One timed span of transcribed speech
///
/// Times are local to the window the span was produced in; the assembler
/// re-bases them to session-absolute seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
    /// Word-level timings, when the service provides them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

/// Word-level timing within a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub start: f64,
    pub end: f64,
    pub content: String,
}

impl TimedSegment {
    /// Shift the segment (and its words) forward by `offset` seconds
    pub fn rebased(&self, offset: f64) -> TimedSegment {
        TimedSegment {
            start: self.start + offset,
            end: self.end + offset,
            text: self.text.clone(),
            words: self
                .words
                .iter()
                .map(|w| Word {
                    start: w.start + offset,
                    end: w.end + offset,
                    content: w.content.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_wire_names() {
        let uid = serde_json::to_string(&ClientMessage::Uid {
            uid: "samyok".to_string(),
        })
        .unwrap();
        assert!(uid.contains(r#""type":"uid""#));

        let done = serde_json::to_string(&ClientMessage::DoneWithSegment {
            sequence: 8,
            is_final: true,
            window_size: 8,
        })
        .unwrap();
        assert!(done.contains(r#""type":"done_with_segment""#));
        assert!(done.contains(r#""is_final":true"#));
        assert!(done.contains(r#""window_size":8"#));
    }

    #[test]
    fn server_message_payload_is_flattened() {
        let msg = ServerMessage::TinyData {
            sequence: 3,
            payload: TranscriptPayload {
                text: "hello".to_string(),
                segments: vec![TimedSegment {
                    start: 0.0,
                    end: 1.2,
                    text: "hello".to_string(),
                    words: vec![],
                }],
                language: Some("en".to_string()),
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"tiny_data""#));
        assert!(json.contains(r#""text":"hello""#));
        // payload fields live at the top level of the frame
        assert!(!json.contains("payload"));

        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        match back {
            ServerMessage::TinyData { sequence, payload } => {
                assert_eq!(sequence, 3);
                assert_eq!(payload.segments.len(), 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn rebased_shifts_segment_and_words() {
        let seg = TimedSegment {
            start: 1.0,
            end: 2.5,
            text: "word".to_string(),
            words: vec![Word {
                start: 1.0,
                end: 2.5,
                content: "word".to_string(),
            }],
        };
        let shifted = seg.rebased(10.0);
        assert_eq!(shifted.start, 11.0);
        assert_eq!(shifted.end, 12.5);
        assert_eq!(shifted.words[0].start, 11.0);
        assert_eq!(shifted.words[0].end, 12.5);
    }
}
