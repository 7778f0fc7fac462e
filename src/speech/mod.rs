//! Spoken example sentences for the lessons.
//!
//! Components:
//! - `store`: durable text → PCM cache on disk
//! - `memory`: per-session decoded cache
//! - `pcm`: 16-bit LE PCM → planar f32 decoding
//! - `gemini`: Gemini TTS client (+ `usage` ledger of metered calls)
//! - `playback`: single-slot playback controller with rodio output
//! - `session`: the `speak` orchestration tying them together

pub mod gemini;
pub mod memory;
pub mod pcm;
pub mod playback;
pub mod session;
pub mod store;
pub mod usage;

pub use gemini::{GeminiTtsClient, SpeechSynthesizer};
pub use pcm::{decode_pcm16, DecodedAudio, PcmFormat};
pub use playback::{AudioOutput, OnComplete, PlaybackController, RodioOutput};
pub use session::{AudioSource, SpeakOutcome, SpeechSession};
pub use store::{AudioStore, FileAudioStore};
