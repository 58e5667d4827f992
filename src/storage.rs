//! Local storage module for saving transcripts
//!
//! Writes the finished transcript to the configured directory, or to the
//! user's Documents folder when none is configured.

use crate::transcript::TranscriptAssembler;
use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Resolve the transcripts directory
///
/// An empty configured value means the default location in Documents;
/// when no documents directory exists either, the current directory is
/// used.
fn transcripts_dir(configured: &str) -> PathBuf {
    if !configured.trim().is_empty() {
        return PathBuf::from(configured);
    }
    dirs::document_dir()
        .map(|d| d.join("EchoNote").join("transcripts"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Save the assembled transcript as a timestamped markdown file
///
/// Returns the path to the saved file
pub fn save_transcript(
    configured_dir: &str,
    assembler: &TranscriptAssembler,
) -> std::io::Result<PathBuf> {
    let dir = transcripts_dir(configured_dir);
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
        info!("Created transcripts directory: {:?}", dir);
    }

    let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
    let filepath = dir.join(format!("recording-{}.md", timestamp));

    let mut file = fs::File::create(&filepath)?;
    file.write_all(to_markdown(assembler).as_bytes())?;
    file.flush()?;

    info!("Saved transcript to: {:?}", filepath);
    Ok(filepath)
}

/// Render the transcript as markdown: one timestamped line per finalized
/// span, the never-finalized tail marked as in progress.
fn to_markdown(assembler: &TranscriptAssembler) -> String {
    let mut out = String::from("# Recording transcript\n\n");
    for segment in assembler.finalized_segments() {
        out.push_str(&format!(
            "- `{:.2}s – {:.2}s` {}\n",
            segment.start,
            segment.end,
            segment.text.trim()
        ));
    }
    if let Some(pending) = assembler.pending_text() {
        let pending = pending.trim();
        if !pending.is_empty() {
            out.push_str(&format!("\n*(in progress)* {}\n", pending));
        }
    }
    out
}
