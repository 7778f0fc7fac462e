//! Synthesis usage ledger.
//!
//! The TTS API is metered, so every network synthesis attempt is appended to
//! `{dir}/{date}-tts.jsonl`. Cache hits never reach this file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub fn default_usage_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gotta-speak")
        .join("usage")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: String,
    pub model: String,
    pub voice: String,
    pub text_chars: usize,
    pub audio_bytes: usize,
    pub latency_ms: i64,
    /// `ok`, or a short failure reason.
    pub outcome: String,
}

impl UsageRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == "ok"
    }
}

#[derive(Debug, Clone)]
pub struct UsageLog {
    dir: PathBuf,
}

impl UsageLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{date}-tts.jsonl"))
    }

    pub fn record(&self, record: &UsageRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("Failed to create usage dir: {e}");
            return;
        }

        let date = Local::now().format("%Y-%m-%d").to_string();
        let path = self.file_for(&date);

        let mut file = match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to open usage file: {e}");
                return;
            }
        };

        match serde_json::to_string(record) {
            Ok(line) => {
                if let Err(e) = writeln!(file, "{line}") {
                    warn!("Failed to write usage record: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize usage record: {e}"),
        }
    }

    pub fn load(&self, date: &str) -> Vec<UsageRecord> {
        let contents = match fs::read_to_string(self.file_for(date)) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Dates with usage records, oldest first.
    pub fn list_dates(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        let mut dates: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_suffix("-tts.jsonl").map(str::to_string)
            })
            .collect();
        dates.sort();
        dates
    }

    pub fn report(&self, date: &str) -> String {
        let records = self.load(date);
        if records.is_empty() {
            return format!("No synthesis calls recorded for {date}.");
        }

        let total = records.len();
        let ok: Vec<&UsageRecord> = records.iter().filter(|r| r.succeeded()).collect();
        let chars: usize = ok.iter().map(|r| r.text_chars).sum();
        let audio_bytes: usize = ok.iter().map(|r| r.audio_bytes).sum();
        let avg_latency =
            records.iter().map(|r| r.latency_ms as f64).sum::<f64>() / total as f64;

        let mut failures: BTreeMap<&str, usize> = BTreeMap::new();
        for r in records.iter().filter(|r| !r.succeeded()) {
            *failures.entry(r.outcome.as_str()).or_insert(0) += 1;
        }

        let mut report = format!(
            "# Synthesis usage for {date}\n\n\
            - Calls: {total}\n\
            - Succeeded: {}\n\
            - Characters synthesized: {chars}\n\
            - Audio received: {:.1} KiB\n\
            - Avg latency: {avg_latency:.0}ms\n",
            ok.len(),
            audio_bytes as f64 / 1024.0,
        );

        if !failures.is_empty() {
            report.push_str("\n## Failures\n");
            for (outcome, count) in &failures {
                report.push_str(&format!("- {outcome}: {count}\n"));
            }
        }

        report
    }
}
