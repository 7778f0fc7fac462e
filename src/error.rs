//! Error taxonomy for the speech subsystem.
//!
//! None of these ever reach the learner: `SpeechSession::speak` logs them and
//! degrades to silence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    /// No API credential configured. Expected on fresh installs.
    #[error("speech synthesis is not configured (no API key)")]
    ConfigurationUnavailable,

    #[error("audio store error: {0}")]
    Storage(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("malformed audio payload: {0}")]
    Decode(String),

    #[error("audio playback failed: {0}")]
    Playback(String),
}

impl SpeechError {
    /// Whether this is the quiet "nothing configured" case rather than a fault.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ConfigurationUnavailable)
    }
}
