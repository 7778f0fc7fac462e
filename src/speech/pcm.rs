//! Raw PCM decoding for Gemini TTS payloads.
//!
//! Gemini returns headerless 16-bit signed little-endian PCM, mono, 24kHz.
//! Samples are de-interleaved into one `Vec<f32>` per channel and normalised
//! by 1/32768.

use std::time::Duration;

use crate::error::SpeechError;

pub const GEMINI_SAMPLE_RATE: u32 = 24000;
pub const GEMINI_CHANNELS: u16 = 1;

const BYTES_PER_SAMPLE: usize = 2;

/// Layout of an encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: GEMINI_SAMPLE_RATE,
            channels: GEMINI_CHANNELS,
        }
    }
}

/// Planar float audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Re-interleave for output backends that take a flat sample stream.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }
}

/// Decode 16-bit LE interleaved PCM into planar floats.
///
/// Sample `i` of channel `c` is `int16[i * channels + c] / 32768.0`.
pub fn decode_pcm16(bytes: &[u8], format: PcmFormat) -> Result<DecodedAudio, SpeechError> {
    let num_channels = format.channels as usize;
    if num_channels == 0 {
        return Err(SpeechError::Decode("channel count must be at least 1".into()));
    }
    if format.sample_rate == 0 {
        return Err(SpeechError::Decode("sample rate must be non-zero".into()));
    }
    if bytes.is_empty() {
        return Err(SpeechError::Decode("empty audio payload".into()));
    }

    let frame_bytes = BYTES_PER_SAMPLE * num_channels;
    if bytes.len() % frame_bytes != 0 {
        return Err(SpeechError::Decode(format!(
            "{} bytes is not a whole number of {num_channels}-channel 16-bit frames",
            bytes.len()
        )));
    }

    let frame_count = bytes.len() / frame_bytes;
    let mut channels = vec![Vec::with_capacity(frame_count); num_channels];

    for (i, chunk) in bytes.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        channels[i % num_channels].push(sample as f32 / 32768.0);
    }

    Ok(DecodedAudio {
        sample_rate: format.sample_rate,
        channels,
    })
}
