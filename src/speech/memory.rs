//! Session-scoped cache of decoded audio, keyed by exact utterance text.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::pcm::DecodedAudio;

#[derive(Default)]
pub struct DecodedCache {
    entries: Mutex<HashMap<String, Arc<DecodedAudio>>>,
}

impl DecodedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, text: &str) -> Option<Arc<DecodedAudio>> {
        self.entries.lock().unwrap().get(text).cloned()
    }

    pub fn insert(&self, text: &str, audio: Arc<DecodedAudio>) {
        self.entries.lock().unwrap().insert(text.to_string(), audio);
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.lock().unwrap().contains_key(text)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every decoded buffer. Playback already holding an `Arc` keeps its copy.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
