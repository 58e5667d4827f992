//! Per-user audio segment store
//!
//! Each session appends raw audio into one file per segment under the
//! configured audio root, named `{uid}-{sequence}.pcm`, which is the layout
//! the speech service reads its accumulated per-user state from. The store is
//! exclusively owned by its session's connection task, which is what
//! guarantees chunk `k+1` is never appended before chunk `k` has been
//! written.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Append-only audio storage for one session
#[derive(Debug)]
pub struct SegmentStore {
    uid: String,
    root: PathBuf,
}

impl SegmentStore {
    /// Open a store for `uid`, creating the audio root if needed.
    ///
    /// The uid is client-declared and becomes part of a file name, so
    /// anything that could leave the audio root is refused.
    pub async fn open(root: impl AsRef<Path>, uid: &str) -> io::Result<Self> {
        if uid.is_empty() || uid.contains(['/', '\\']) || uid.contains("..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unusable uid {:?}", uid),
            ));
        }
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            uid: uid.to_string(),
            root,
        })
    }

    /// File that holds segment `sequence` for this session's user
    pub fn segment_path(&self, sequence: u64) -> PathBuf {
        self.root.join(format!("{}-{}.pcm", self.uid, sequence))
    }

    /// Append one chunk of raw audio to its segment file
    pub async fn append(&self, sequence: u64, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.segment_path(sequence))
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }
}
