//! Durable audio cache: utterance text → encoded PCM bytes on disk.
//!
//! Each entry is its own file named by the SHA-256 of the text. The file
//! starts with the text itself (u32 LE length + UTF-8) so lookups are exact
//! string matches, followed by the raw audio. Nothing is ever evicted.
//!
//! Storage faults never escape the `AudioStore` impl: reads degrade to a miss,
//! writes are logged and dropped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::SpeechError;

const ENTRY_EXT: &str = "pcm";

/// Distinguishes temp files of concurrent writes within this process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Stored bytes for `text`, or `None` on miss or storage failure.
    async fn get(&self, text: &str) -> Option<Vec<u8>>;

    /// Overwrite the entry for `text`. Failures are logged, never returned.
    async fn put(&self, text: &str, audio: &[u8]);
}

/// Default on-disk location of the audio cache.
pub fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gotta-speak")
        .join("audio")
}

pub struct FileAudioStore {
    dir: PathBuf,
}

impl FileAudioStore {
    /// Create the store directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SpeechError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            SpeechError::Storage(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, text: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXT}", entry_key(text)))
    }

    /// Private to one write: two writes of the same text never share a temp file.
    fn temp_path(&self, text: &str) -> PathBuf {
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.{}-{seq}.tmp",
            entry_key(text),
            std::process::id()
        ))
    }

    async fn read_entry(&self, text: &str) -> Result<Option<Vec<u8>>, SpeechError> {
        let path = self.entry_path(text);
        let contents = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SpeechError::Storage(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        let (stored_text, audio) = split_entry(&contents)
            .ok_or_else(|| SpeechError::Storage(format!("corrupt entry {}", path.display())))?;

        if stored_text != text.as_bytes() {
            debug!("Hash collision or stale entry at {}", path.display());
            return Ok(None);
        }

        Ok(Some(audio.to_vec()))
    }

    async fn write_entry(&self, text: &str, audio: &[u8]) -> Result<(), SpeechError> {
        let path = self.entry_path(text);
        let tmp = self.temp_path(text);

        let mut contents = Vec::with_capacity(4 + text.len() + audio.len());
        contents.extend_from_slice(&(text.len() as u32).to_le_bytes());
        contents.extend_from_slice(text.as_bytes());
        contents.extend_from_slice(audio);

        tokio::fs::write(&tmp, &contents)
            .await
            .map_err(|e| SpeechError::Storage(format!("write {}: {e}", tmp.display())))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SpeechError::Storage(format!(
                "rename into {}: {e}",
                path.display()
            )));
        }
        Ok(())
    }

    /// Number of cached utterances.
    pub fn entry_count(&self) -> Result<usize, SpeechError> {
        Ok(self.entry_files()?.len())
    }

    /// Delete every cached utterance. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, SpeechError> {
        let files = self.entry_files()?;
        for path in &files {
            std::fs::remove_file(path)
                .map_err(|e| SpeechError::Storage(format!("remove {}: {e}", path.display())))?;
        }
        Ok(files.len())
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, SpeechError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| SpeechError::Storage(format!("list {}: {e}", self.dir.display())))?;

        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == ENTRY_EXT))
            .collect())
    }
}

#[async_trait]
impl AudioStore for FileAudioStore {
    async fn get(&self, text: &str) -> Option<Vec<u8>> {
        match self.read_entry(text).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Audio store read failed, treating as miss: {e}");
                None
            }
        }
    }

    async fn put(&self, text: &str, audio: &[u8]) {
        match self.write_entry(text, audio).await {
            Ok(()) => debug!("Stored {} audio bytes for {:?}", audio.len(), text),
            Err(e) => warn!("Audio store write failed: {e}"),
        }
    }
}

fn entry_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Split an entry file into (text bytes, audio bytes).
fn split_entry(contents: &[u8]) -> Option<(&[u8], &[u8])> {
    let len_bytes: [u8; 4] = contents.get(..4)?.try_into().ok()?;
    let text_len = u32::from_le_bytes(len_bytes) as usize;
    let rest = &contents[4..];
    if rest.len() < text_len {
        return None;
    }
    Some(rest.split_at(text_len))
}
