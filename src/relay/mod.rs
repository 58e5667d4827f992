//! Relay/aggregation service
//!
//! Accepts WebSocket connections from recording clients, persists their
//! audio chunks into per-user segment stores, and drives the speech
//! service at segment boundaries, pushing `tiny_data`/`complete_data`
//! frames back over the originating connection.
//!
//! # Concurrency
//! One tokio task per connection, owning that connection's `Session`
//! outright. Frames are handled in arrival order inside the task, which
//! serializes chunk appends and boundary processing for a session without
//! locks; sessions share nothing, so one session's adapter latency never
//! blocks another's ingestion.

mod adapter;
mod session;
mod store;

pub use adapter::{HttpAdapter, SpeechAdapter};
pub use session::Session;
pub use store::SegmentStore;

use crate::config::Config;
use crate::protocol::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

/// Run the relay until the process is stopped
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let adapter = HttpAdapter::new(
        &config.adapter.base_url,
        Duration::from_secs(config.adapter.request_timeout_secs),
    )?;

    let listener = TcpListener::bind(&config.relay.listen_addr).await?;
    info!("relay listening on ws://{}", config.relay.listen_addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        let adapter = adapter.clone();
        let audio_root = config.relay.audio_root.clone();

        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => handle_connection(ws, peer, adapter, audio_root).await,
                Err(e) => warn!(%peer, "WebSocket handshake failed: {}", e),
            }
        });
    }
}

/// Drive one client connection to completion.
///
/// The session is created when the client declares its uid; audio frames
/// arriving before that are logged and dropped. When the loop ends (close
/// frame, protocol error, or disconnect) the session and its store are
/// dropped with the task, and any result produced by an in-flight adapter
/// call is discarded when the send fails.
async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
    peer: SocketAddr,
    adapter: HttpAdapter,
    audio_root: String,
) {
    info!(%peer, "client connected");
    let (mut ws_sink, mut ws_stream) = ws.split();
    let mut session: Option<Session<HttpAdapter>> = None;

    while let Some(frame) = ws_stream.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                warn!(%peer, "connection error: {}", e);
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let parsed: ClientMessage = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(%peer, "unparseable frame: {}", e);
                        let report = ServerMessage::Error {
                            message: format!("invalid frame: {}", e),
                        };
                        if send(&mut ws_sink, &report).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                match parsed {
                    ClientMessage::Uid { uid } => {
                        match SegmentStore::open(&audio_root, &uid).await {
                            Ok(store) => {
                                info!(%peer, %uid, "session opened");
                                session = Some(Session::new(uid, store, adapter.clone()));
                            }
                            Err(e) => {
                                error!(%peer, %uid, "failed to open segment store: {}", e);
                                let report = ServerMessage::Error {
                                    message: "segment store unavailable".to_string(),
                                };
                                if send(&mut ws_sink, &report).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    ClientMessage::StreamAudio { blob, sequence } => match session.as_mut() {
                        Some(session) => {
                            if let Err(e) = session.ingest_chunk(sequence, &blob).await {
                                // dropped chunk: a transcript gap, not fatal
                                warn!(uid = %session.uid(), sequence, "chunk dropped: {}", e);
                            }
                        }
                        None => warn!(%peer, sequence, "audio before uid, chunk dropped"),
                    },
                    ClientMessage::DoneWithSegment {
                        sequence,
                        is_final,
                        window_size,
                    } => {
                        if let Some(session) = session.as_mut() {
                            for out in session.segment_done(sequence, is_final, window_size).await
                            {
                                if send(&mut ws_sink, &out).await.is_err() {
                                    // connection gone; discard the result
                                    info!(uid = %session.uid(), "client gone, result discarded");
                                    return;
                                }
                            }
                        } else {
                            warn!(%peer, sequence, "boundary before uid, ignored");
                        }
                    }
                }
            }
            Message::Ping(data) => {
                if ws_sink.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Message::Close(reason) => {
                info!(%peer, ?reason, "client closed the connection");
                break;
            }
            _ => {}
        }
    }

    match session {
        Some(session) => info!(uid = %session.uid(), "session closed"),
        None => info!(%peer, "connection closed before uid"),
    }
}

async fn send<S>(sink: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("failed to encode frame: {}", e);
            return Ok(());
        }
    };
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
