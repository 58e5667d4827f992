//! Recording client
//!
//! Wires the pieces of a live recording session together: microphone
//! capture feeds the segment encoder, encoder events are forwarded to the
//! relay over a WebSocket, and the relay's `tiny_data`/`complete_data`
//! frames are folded into the transcript assembler and rendered to the
//! terminal. Ctrl+C stops capture, the encoder flushes its in-flight
//! segment, the trailing frames go out, and the finished transcript is
//! saved to disk.

use crate::audio::{self, TARGET_SAMPLE_RATE};
use crate::config::Config;
use crate::encoder::{spawn_segmenter, EncoderEvent};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::storage;
use crate::transcript::TranscriptAssembler;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

/// How long to wait after stop for straggler results from the relay
const DRAIN_TIMEOUT_SECS: u64 = 15;

/// Run one recording session until Ctrl+C
pub async fn record(config: &Config) -> anyhow::Result<()> {
    // Fails fast if no capture device is available
    let (mut audio_handle, audio_rx) = audio::start_capture()?;

    let mut events = spawn_segmenter(
        audio_rx,
        config.client.window_secs,
        config.client.window_fanout,
        TARGET_SAMPLE_RATE,
    );

    info!("connecting to relay at {}", config.client.relay_url);
    let (ws, _) = connect_async(config.client.relay_url.as_str()).await?;
    let (mut ws_sink, mut ws_stream) = ws.split();

    // The uid must precede any audio frames
    let uid_frame = serde_json::to_string(&ClientMessage::Uid {
        uid: config.client.uid.clone(),
    })?;
    ws_sink.send(Message::Text(uid_frame)).await?;

    let assembler = Arc::new(Mutex::new(TranscriptAssembler::new()));

    // Receive task: folds relay frames into the assembler and re-renders
    let assembler_for_events = assembler.clone();
    let receive_task = tokio::spawn(async move {
        let mut renderer = Renderer::default();
        while let Some(frame) = ws_stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("relay connection error: {}", e);
                    break;
                }
            };
            let message: ServerMessage = match serde_json::from_str(&text) {
                Ok(message) => message,
                Err(e) => {
                    warn!("unparseable relay frame: {}", e);
                    continue;
                }
            };
            if let Ok(mut assembler) = assembler_for_events.lock() {
                match message {
                    ServerMessage::TinyData { sequence, payload } => {
                        assembler.apply_partial(sequence, &payload);
                    }
                    ServerMessage::CompleteData { sequence, payload } => {
                        assembler.apply_final(sequence, &payload);
                    }
                    ServerMessage::Error { message } => {
                        warn!("relay reported: {}", message);
                        continue;
                    }
                }
                renderer.render(&assembler);
            }
        }
    });

    info!("recording, press Ctrl+C to stop");

    // Forward encoder events until the stream ends (stop flush included)
    loop {
        tokio::select! {
            maybe_event = events.recv() => match maybe_event {
                Some(event) => {
                    let frame = serde_json::to_string(&to_wire(event))?;
                    ws_sink.send(Message::Text(frame)).await?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("stopping recording");
                audio_handle.stop();
                // the encoder flushes and closes the event stream
            }
        }
    }

    // Let the relay finish the trailing boundary before closing
    let _ = ws_sink.send(Message::Close(None)).await;
    if tokio::time::timeout(Duration::from_secs(DRAIN_TIMEOUT_SECS), receive_task)
        .await
        .is_err()
    {
        warn!("gave up waiting for trailing transcription results");
    }

    let assembler = assembler
        .lock()
        .map_err(|_| anyhow::anyhow!("assembler lock poisoned"))?;
    if assembler.finalized_segments().is_empty() && assembler.pending_text().is_none() {
        info!("nothing transcribed, not saving");
        return Ok(());
    }
    let path = storage::save_transcript(&config.client.transcript_dir, &assembler)?;
    info!("transcript saved to {}", path.display());
    Ok(())
}

fn to_wire(event: EncoderEvent) -> ClientMessage {
    match event {
        EncoderEvent::Chunk { sequence, bytes } => ClientMessage::StreamAudio {
            blob: BASE64.encode(bytes),
            sequence,
        },
        EncoderEvent::SegmentDone {
            sequence,
            is_final,
            window_size,
        } => ClientMessage::DoneWithSegment {
            sequence,
            is_final,
            window_size,
        },
    }
}

/// Prints finalized lines once and the in-progress tail after each update
#[derive(Default)]
struct Renderer {
    printed: usize,
}

impl Renderer {
    fn render(&mut self, assembler: &TranscriptAssembler) {
        let finalized = assembler.finalized_segments();
        for segment in &finalized[self.printed..] {
            println!(
                "[{} - {}] {}",
                format_time(segment.start),
                format_time(segment.end),
                segment.text.trim()
            );
        }
        self.printed = finalized.len();

        if let Some(pending) = assembler.pending_text() {
            let pending = pending.trim();
            if !pending.is_empty() {
                println!("  … {}", pending);
            }
        }
    }
}

/// Seconds to a `m:ss` display string
fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_time_pads_seconds() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(9.6), "0:09");
        assert_eq!(format_time(65.0), "1:05");
        assert_eq!(format_time(600.0), "10:00");
    }

    #[test]
    fn encoder_events_map_onto_the_wire_contract() {
        let chunk = to_wire(EncoderEvent::Chunk {
            sequence: 3,
            bytes: vec![1, 2, 3],
        });
        match chunk {
            ClientMessage::StreamAudio { blob, sequence } => {
                assert_eq!(sequence, 3);
                assert_eq!(BASE64.decode(blob).unwrap(), vec![1, 2, 3]);
            }
            other => panic!("unexpected frame: {:?}", other),
        }

        let done = to_wire(EncoderEvent::SegmentDone {
            sequence: 8,
            is_final: true,
            window_size: 8,
        });
        assert!(matches!(
            done,
            ClientMessage::DoneWithSegment {
                sequence: 8,
                is_final: true,
                window_size: 8,
            }
        ));
    }
}
