//! gotta-speak: audio for the gotta/gonna/wanna lessons.
//!
//! Example sentences are synthesized once through Gemini TTS, kept on disk,
//! decoded into memory per session, and played one at a time.

pub mod config;
pub mod error;
pub mod progress;
pub mod speech;

pub use error::SpeechError;
