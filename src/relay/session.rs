//! Per-connection session state
//!
//! A `Session` owns everything mutable about one live recording: the
//! declared user id and the segment store. It is created when the client
//! declares its uid and dropped when the connection closes. The owning
//! connection task handles frames strictly in arrival order, so chunk
//! appends and boundary processing for one session are serialized without
//! any locking.

use crate::error::RelayError;
use crate::protocol::ServerMessage;
use crate::relay::adapter::SpeechAdapter;
use crate::relay::store::SegmentStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, warn};

/// State of one live recording session on the relay
#[derive(Debug)]
pub struct Session<A> {
    uid: String,
    store: SegmentStore,
    adapter: A,
}

impl<A: SpeechAdapter> Session<A> {
    pub fn new(uid: String, store: SegmentStore, adapter: A) -> Self {
        Self {
            uid,
            store,
            adapter,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Append one base64-encoded audio chunk to the segment store.
    ///
    /// The caller logs and drops failures: a lost chunk is a gap in the
    /// transcript, not a reason to end the session.
    pub async fn ingest_chunk(&mut self, sequence: u64, blob: &str) -> Result<(), RelayError> {
        let bytes = BASE64.decode(blob)?;
        self.store.append(sequence, &bytes).await?;
        debug!(uid = %self.uid, sequence, bytes = bytes.len(), "chunk appended");
        Ok(())
    }

    /// Handle a segment boundary: run the quick pass, and for a window
    /// boundary also the revise pass. Returns the frames to deliver to
    /// this session's own connection; results are never broadcast.
    ///
    /// Adapter failures are logged and swallowed: a missed partial costs
    /// latency, a missed final leaves the window perpetually in progress.
    pub async fn segment_done(
        &mut self,
        sequence: u64,
        is_final: bool,
        window_size: u32,
    ) -> Vec<ServerMessage> {
        let mut out = Vec::new();

        match self.adapter.quick_pass(&self.uid, sequence).await {
            Ok(payload) => out.push(ServerMessage::TinyData { sequence, payload }),
            Err(e) => warn!(uid = %self.uid, sequence, "quick pass failed: {}", e),
        }

        if is_final {
            match self
                .adapter
                .revise_pass(&self.uid, sequence, window_size)
                .await
            {
                Ok(payload) => out.push(ServerMessage::CompleteData { sequence, payload }),
                Err(e) => warn!(uid = %self.uid, sequence, "revise pass failed: {}", e),
            }
        }

        out
    }
}
