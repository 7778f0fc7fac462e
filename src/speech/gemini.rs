//! Gemini text-to-speech client.
//!
//! One `generateContent` call per utterance with audio output modality and a
//! fixed prebuilt voice. The audio comes back base64-encoded inside the first
//! candidate; we hand back the raw PCM bytes untouched.

use std::time::Instant;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::usage::{UsageLog, UsageRecord};
use crate::config::GeminiConfig;
use crate::error::SpeechError;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Whether a credential is configured. No network involved.
    fn is_available(&self) -> bool;

    /// Encoded PCM for `text`.
    ///
    /// Returns `ConfigurationUnavailable` without touching the network when no
    /// credential is set.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

// --- Wire types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn new(text: &'a str, voice: &'a str) -> Self {
        Self {
            contents: [RequestContent {
                parts: [TextPart { text }],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
                    },
                },
            },
        }
    }
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: String,
}

/// Pull the first inline audio payload out of a response body and base64-decode it.
fn extract_audio(body: &str) -> Result<Vec<u8>, SpeechError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| SpeechError::Synthesis(format!("unparsable response: {e}")))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| SpeechError::Synthesis("no candidates in response".into()))?;

    let finish_reason = candidate.finish_reason;
    let payload = candidate
        .content
        .into_iter()
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
        .ok_or_else(|| {
            SpeechError::Synthesis(format!(
                "no audio in response (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;

    general_purpose::STANDARD
        .decode(payload.data.as_bytes())
        .map_err(|e| SpeechError::Synthesis(format!("invalid base64 audio: {e}")))
}

pub struct GeminiTtsClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    voice: String,
    usage: Option<UsageLog>,
}

impl GeminiTtsClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SpeechError::Synthesis(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.resolve_api_key(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            usage: None,
        })
    }

    /// Record every network call in `usage`.
    pub fn with_usage_log(mut self, usage: UsageLog) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    async fn request(&self, api_key: &str, text: &str) -> Result<Vec<u8>, SpeechError> {
        let body = GenerateRequest::new(text, &self.voice);

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SpeechError::Synthesis(format!("cannot connect to {}", self.endpoint))
                } else if e.is_timeout() {
                    SpeechError::Synthesis("request timed out".into())
                } else {
                    SpeechError::Synthesis(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        let text_body = resp
            .text()
            .await
            .map_err(|e| SpeechError::Synthesis(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let preview: String = text_body.chars().take(200).collect();
            return Err(SpeechError::Synthesis(format!("http {}: {preview}", status.as_u16())));
        }

        extract_audio(&text_body)
    }

    fn log_usage(&self, text_chars: usize, result: &Result<Vec<u8>, SpeechError>, started: Instant) {
        let Some(usage) = &self.usage else {
            return;
        };

        let outcome = match result {
            Ok(_) => "ok".to_string(),
            Err(SpeechError::Synthesis(reason)) => reason.chars().take(80).collect(),
            Err(e) => e.to_string(),
        };

        usage.record(&UsageRecord {
            timestamp: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            model: self.model.clone(),
            voice: self.voice.clone(),
            text_chars,
            audio_bytes: result.as_ref().map_or(0, Vec::len),
            latency_ms: started.elapsed().as_millis() as i64,
            outcome,
        });
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiTtsClient {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(SpeechError::ConfigurationUnavailable);
        };

        let text_chars = text.chars().count();
        debug!(
            "Requesting speech from {} ({text_chars} chars, voice {})",
            self.model, self.voice
        );
        let started = Instant::now();
        let result = self.request(api_key, text).await;
        self.log_usage(text_chars, &result, started);

        if let Ok(audio) = &result {
            info!(
                "Synthesized {} bytes for {:?} in {}ms",
                audio.len(),
                text,
                started.elapsed().as_millis()
            );
        }
        result
    }
}
