//! Shared fakes for the speech integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use gotta_speak::speech::playback::ActivePlayback;
use gotta_speak::speech::{
    AudioOutput, AudioStore, DecodedAudio, OnComplete, PcmFormat, PlaybackController,
    SpeechSession, SpeechSynthesizer,
};
use gotta_speak::SpeechError;

pub const POLL: Duration = Duration::from_millis(2);

/// Little-endian int16 PCM bytes.
pub fn pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

// --- Durable store ---

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_entry(text: &str, audio: Vec<u8>) -> Self {
        let store = Self::default();
        store.entries.lock().unwrap().insert(text.to_string(), audio);
        store
    }

    pub fn entry(&self, text: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(text).cloned()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioStore for MemoryStore {
    async fn get(&self, text: &str) -> Option<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.entry(text)
    }

    async fn put(&self, text: &str, audio: &[u8]) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .insert(text.to_string(), audio.to_vec());
    }
}

// --- Synthesizer ---

pub struct FakeSynth {
    available: bool,
    response: Result<Vec<u8>, String>,
    /// Calls that would have hit the network.
    pub calls: AtomicUsize,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeSynth {
    pub fn returning(audio: Vec<u8>) -> Self {
        Self {
            available: true,
            response: Ok(audio),
            calls: AtomicUsize::new(0),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
            ..Self::returning(Vec::new())
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            available: false,
            ..Self::returning(pcm(&[1, 2]))
        }
    }

    /// Hold synthesis of `text` until the returned `Notify` is signalled.
    pub fn hold(&self, text: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(text.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        if !self.available {
            return Err(SpeechError::ConfigurationUnavailable);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gates.lock().unwrap().get(text).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.response.clone().map_err(SpeechError::Synthesis)
    }
}

// --- Audio output ---

#[derive(Default)]
pub struct PlayState {
    pub samples: Vec<f32>,
    pub finished: AtomicBool,
    pub stopped: AtomicBool,
}

impl PlayState {
    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct FakeHandle {
    state: Arc<PlayState>,
    auto_finish: bool,
}

impl ActivePlayback for FakeHandle {
    fn is_finished(&self) -> bool {
        self.auto_finish
            || self.state.finished.load(Ordering::SeqCst)
            || self.state.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeOutput {
    plays: Mutex<Vec<Arc<PlayState>>>,
    /// Every playback reports finished as soon as it is polled.
    pub auto_finish: bool,
}

impl FakeOutput {
    pub fn auto_finishing() -> Self {
        Self {
            auto_finish: true,
            ..Self::default()
        }
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().unwrap().len()
    }

    pub fn nth(&self, i: usize) -> Arc<PlayState> {
        self.plays.lock().unwrap()[i].clone()
    }
}

impl AudioOutput for FakeOutput {
    fn play(&self, audio: &DecodedAudio) -> Result<Box<dyn ActivePlayback>, SpeechError> {
        let state = Arc::new(PlayState {
            samples: audio.interleaved(),
            ..PlayState::default()
        });
        self.plays.lock().unwrap().push(state.clone());
        Ok(Box::new(FakeHandle {
            state,
            auto_finish: self.auto_finish,
        }))
    }
}

// --- Session helpers ---

pub fn session(
    store: Arc<dyn AudioStore>,
    synth: Arc<dyn SpeechSynthesizer>,
    output: Option<Arc<FakeOutput>>,
) -> Arc<SpeechSession> {
    let playback = output.map(|o| {
        let o: Arc<dyn AudioOutput> = o;
        PlaybackController::new(o, POLL)
    });
    Arc::new(SpeechSession::new(store, synth, playback, PcmFormat::default()))
}

pub fn counter() -> (Arc<AtomicUsize>, OnComplete) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    (
        count,
        Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

pub fn count(c: &AtomicUsize) -> usize {
    c.load(Ordering::SeqCst)
}

pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Give watcher tasks a few poll intervals to misbehave.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(40)).await;
}
