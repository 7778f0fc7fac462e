//! Speak orchestration: memory cache → durable store → Gemini → playback.
//!
//! A `SpeechSession` lives for one app session. It owns the decoded cache,
//! the playback controller (absent when there is no audio device) and the
//! background write-backs to the durable store. Failures anywhere in the
//! chain end in silence, never in an error for the caller.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::gemini::SpeechSynthesizer;
use super::memory::DecodedCache;
use super::pcm::{decode_pcm16, DecodedAudio, PcmFormat};
use super::playback::{OnComplete, PlaybackController, StartOutcome};
use super::store::AudioStore;
use crate::error::SpeechError;

/// Which tier supplied the audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    Memory,
    Store,
    Synthesized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Playback started; the callback fires when it ends naturally.
    Started(AudioSource),
    /// No audio could be resolved. Callback already fired.
    Silent,
    /// A newer request took over. Callback dropped.
    Superseded,
    /// No audio output available. Callback already fired.
    NoOutput,
}

pub struct SpeechSession {
    memory: DecodedCache,
    store: Arc<dyn AudioStore>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    playback: Option<PlaybackController>,
    format: PcmFormat,
    pending_writes: Mutex<JoinSet<()>>,
}

impl SpeechSession {
    pub fn new(
        store: Arc<dyn AudioStore>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        playback: Option<PlaybackController>,
        format: PcmFormat,
    ) -> Self {
        if playback.is_none() {
            info!("Speech session running without audio output");
        }
        if !synthesizer.is_available() {
            info!("No TTS API key configured, only cached audio will play");
        }
        Self {
            memory: DecodedCache::new(),
            store,
            synthesizer,
            playback,
            format,
            pending_writes: Mutex::new(JoinSet::new()),
        }
    }

    pub fn has_output(&self) -> bool {
        self.playback.is_some()
    }

    pub fn memory(&self) -> &DecodedCache {
        &self.memory
    }

    pub fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(PlaybackController::is_playing)
    }

    /// Speak `text`, interrupting anything already playing.
    ///
    /// `on_complete` fires exactly once unless this request is superseded by
    /// a newer one or by [`stop`](Self::stop), in which case it never fires.
    pub async fn speak(&self, text: &str, on_complete: Option<OnComplete>) -> SpeakOutcome {
        let Some(playback) = &self.playback else {
            if let Some(callback) = on_complete {
                callback();
            }
            return SpeakOutcome::NoOutput;
        };

        let ticket = playback.issue();

        let Some((audio, source)) = self.resolve(text).await else {
            return if playback.finish_silent(ticket, on_complete) {
                SpeakOutcome::Silent
            } else {
                SpeakOutcome::Superseded
            };
        };

        match playback.start(ticket, &audio, on_complete) {
            StartOutcome::Playing => {
                debug!("Speaking {text:?} from {source:?}");
                SpeakOutcome::Started(source)
            }
            StartOutcome::Superseded => SpeakOutcome::Superseded,
            StartOutcome::Failed => SpeakOutcome::Silent,
        }
    }

    /// Speak and wait until playback ends (or is cut off by another request).
    pub async fn speak_and_wait(&self, text: &str) -> SpeakOutcome {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let outcome = self
            .speak(
                text,
                Some(Box::new(move || {
                    let _ = done_tx.send(());
                })),
            )
            .await;

        if let SpeakOutcome::Started(_) = outcome {
            // Err means the callback was dropped: superseded or stopped.
            let _ = done_rx.await;
        }
        outcome
    }

    /// Resolve `text` into the caches without playing it, and wait for the
    /// durable write-back.
    pub async fn prefetch(&self, text: &str) -> Option<AudioSource> {
        let source = self.resolve(text).await.map(|(_, source)| source);
        self.flush_writes().await;
        source
    }

    /// Stop whatever is playing. Its callback does not fire.
    pub fn stop(&self) {
        if let Some(playback) = &self.playback {
            playback.stop();
        }
    }

    /// Wait for every background store write issued so far.
    pub async fn flush_writes(&self) {
        let mut writes = std::mem::take(&mut *self.pending_writes.lock().unwrap());
        while let Some(result) = writes.join_next().await {
            if let Err(e) = result {
                warn!("Audio store write task failed: {e}");
            }
        }
    }

    /// End of session: stop playback, finish pending writes, drop decoded audio.
    pub async fn shutdown(&self) {
        self.stop();
        self.flush_writes().await;
        let released = self.memory.len();
        self.memory.clear();
        debug!("Speech session closed, released {released} decoded buffers");
    }

    async fn resolve(&self, text: &str) -> Option<(Arc<DecodedAudio>, AudioSource)> {
        if let Some(audio) = self.memory.get(text) {
            return Some((audio, AudioSource::Memory));
        }

        if let Some(bytes) = self.store.get(text).await {
            match decode_pcm16(&bytes, self.format) {
                Ok(audio) => {
                    let audio = Arc::new(audio);
                    self.memory.insert(text, audio.clone());
                    return Some((audio, AudioSource::Store));
                }
                // Fall through and re-fetch; a good result overwrites the entry.
                Err(e) => warn!("Stored audio for {text:?} is unusable: {e}"),
            }
        }

        match self.fetch(text).await {
            Ok(audio) => Some((audio, AudioSource::Synthesized)),
            Err(e) if e.is_unavailable() => {
                debug!("Skipping synthesis for {text:?}: {e}");
                None
            }
            Err(e) => {
                warn!("No audio for {text:?}: {e}");
                None
            }
        }
    }

    async fn fetch(&self, text: &str) -> Result<Arc<DecodedAudio>, SpeechError> {
        let bytes = self.synthesizer.synthesize(text).await?;
        let audio = Arc::new(decode_pcm16(&bytes, self.format)?);

        self.spawn_write_back(text, bytes);
        self.memory.insert(text, audio.clone());
        Ok(audio)
    }

    /// Persist in the background. Nothing waits on this except
    /// `flush_writes`/`shutdown`; a session dropped without either leaves
    /// unfinished writes running detached.
    fn spawn_write_back(&self, text: &str, bytes: Vec<u8>) {
        let store = self.store.clone();
        let text = text.to_string();

        let mut writes = self.pending_writes.lock().unwrap();
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            store.put(&text, &bytes).await;
        });
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        // JoinSet aborts on drop; let pending writes reach the store instead.
        if let Ok(writes) = self.pending_writes.get_mut() {
            writes.detach_all();
        }
    }
}
