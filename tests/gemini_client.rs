//! Gemini client against a local stand-in for the generateContent endpoint.

mod common;

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use common::*;
use gotta_speak::config::GeminiConfig;
use gotta_speak::speech::usage::UsageLog;
use gotta_speak::speech::{
    AudioSource, FileAudioStore, GeminiTtsClient, SpeakOutcome, SpeechSynthesizer,
};
use gotta_speak::SpeechError;

#[derive(Clone)]
struct Endpoint {
    reply: Arc<dyn Fn() -> Response + Send + Sync>,
    seen: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn generate(
    State(endpoint): State<Endpoint>,
    Path(model): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    endpoint.seen.lock().unwrap().push((model, key, body));
    (endpoint.reply)()
}

/// Serve on an ephemeral port; returns the base URL and the request log.
async fn serve(
    reply: impl Fn() -> Response + Send + Sync + 'static,
) -> (String, Arc<Mutex<Vec<(String, Option<String>, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1beta/models/{model}", post(generate))
        .with_state(Endpoint {
            reply: Arc::new(reply),
            seen: seen.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/v1beta"), seen)
}

fn audio_reply(b64: &'static str) -> impl Fn() -> Response + Send + Sync + 'static {
    move || {
        Json(json!({
            "candidates": [{
                "content": { "parts": [{ "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": b64 } }] },
                "finishReason": "STOP"
            }]
        }))
        .into_response()
    }
}

fn client_config(endpoint: &str) -> GeminiConfig {
    GeminiConfig {
        api_key: Some("test-key".into()),
        endpoint: endpoint.to_string(),
        ..GeminiConfig::default()
    }
}

#[tokio::test]
async fn synthesize_posts_request_and_decodes_base64() {
    // [100, -200] as int16 LE
    let (endpoint, seen) = serve(audio_reply("ZAA4/w==")).await;
    let usage_dir = tempfile::tempdir().unwrap();
    let usage = UsageLog::new(usage_dir.path());
    let client = GeminiTtsClient::new(&client_config(&endpoint))
        .unwrap()
        .with_usage_log(usage.clone());

    let audio = client.synthesize("I'm gonna call him later.").await.unwrap();
    assert_eq!(audio, pcm(&[100, -200]));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (model, key, body) = &seen[0];
    assert_eq!(model, "gemini-2.5-flash-preview-tts:generateContent");
    assert_eq!(key.as_deref(), Some("test-key"));
    assert_eq!(body["contents"][0]["parts"][0]["text"], "I'm gonna call him later.");
    assert_eq!(body["generationConfig"]["responseModalities"], json!(["AUDIO"]));
    assert_eq!(
        body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Kore"
    );

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let records = usage.load(&today);
    assert_eq!(records.len(), 1);
    assert!(records[0].succeeded());
    assert_eq!(records[0].audio_bytes, 4);
}

#[tokio::test]
async fn http_error_is_a_synthesis_failure() {
    let (endpoint, _) =
        serve(|| (StatusCode::TOO_MANY_REQUESTS, "quota exhausted").into_response()).await;
    let usage_dir = tempfile::tempdir().unwrap();
    let usage = UsageLog::new(usage_dir.path());
    let client = GeminiTtsClient::new(&client_config(&endpoint))
        .unwrap()
        .with_usage_log(usage.clone());

    match client.synthesize("Do you wanna get some coffee?").await {
        Err(SpeechError::Synthesis(msg)) => assert!(msg.starts_with("http 429")),
        other => panic!("expected synthesis failure, got {other:?}"),
    }

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let records = usage.load(&today);
    assert_eq!(records.len(), 1);
    assert!(records[0].outcome.starts_with("http 429"));
}

#[tokio::test]
async fn response_without_audio_is_a_synthesis_failure() {
    let (endpoint, _) = serve(|| {
        Json(json!({ "candidates": [{ "finishReason": "SAFETY" }] })).into_response()
    })
    .await;
    let client = GeminiTtsClient::new(&client_config(&endpoint)).unwrap();

    assert!(matches!(
        client.synthesize("She gotta leave early.").await,
        Err(SpeechError::Synthesis(_))
    ));
}

#[tokio::test]
async fn speak_through_real_client_and_disk_store() {
    let (endpoint, seen) = serve(audio_reply("ZAA4/w==")).await;
    let cache_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileAudioStore::open(cache_dir.path()).unwrap());
    let client = Arc::new(GeminiTtsClient::new(&client_config(&endpoint)).unwrap());
    let output = Arc::new(FakeOutput::default());
    let session = session(store.clone(), client, Some(output.clone()));

    let outcome = session.speak("I gotta go now.", None).await;
    session.flush_writes().await;

    assert_eq!(outcome, SpeakOutcome::Started(AudioSource::Synthesized));
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(store.entry_count().unwrap(), 1);

    let decoded = session.memory().get("I gotta go now.").unwrap();
    let samples = decoded.channel(0).unwrap();
    assert!((samples[0] - 0.003_051_758).abs() < 1e-7);
    assert!((samples[1] + 0.006_103_516).abs() < 1e-7);

    // A fresh session (new app launch) finds the audio on disk.
    let client = Arc::new(GeminiTtsClient::new(&client_config(&endpoint)).unwrap());
    let relaunched = common::session(store, client, Some(output));
    assert_eq!(
        relaunched.speak("I gotta go now.", None).await,
        SpeakOutcome::Started(AudioSource::Store)
    );
    assert_eq!(seen.lock().unwrap().len(), 1);
}
