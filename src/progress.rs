//! Per-learner lesson progress.
//!
//! One JSON document per user id under the progress directory, shaped like
//! `{"completed": [1, 3], "formalityScore": {"correct": 4, "total": 5}}`.
//! Updates merge: only the fields present in a [`ProgressUpdate`] change.
//! The speech subsystem never reads or writes this.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("invalid user id {0:?}")]
    InvalidUser(String),

    #[error("progress storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt progress document: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn default_progress_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gotta-speak")
        .join("progress")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormalityScore {
    pub correct: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    #[serde(default)]
    pub completed: Vec<u32>,
    #[serde(rename = "formalityScore", default, skip_serializing_if = "Option::is_none")]
    pub formality_score: Option<FormalityScore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub completed: Option<Vec<u32>>,
    pub formality_score: Option<FormalityScore>,
}

impl LessonProgress {
    pub fn is_completed(&self, lesson_id: u32) -> bool {
        self.completed.contains(&lesson_id)
    }

    /// Update with the completed list extended by `lesson_id`, or `None` if
    /// it was already there.
    pub fn completion_update(&self, lesson_id: u32) -> Option<ProgressUpdate> {
        if self.completed.contains(&lesson_id) {
            return None;
        }
        let mut completed = self.completed.clone();
        completed.push(lesson_id);
        Some(ProgressUpdate {
            completed: Some(completed),
            ..ProgressUpdate::default()
        })
    }

    pub fn merge(&mut self, update: ProgressUpdate) {
        if let Some(mut completed) = update.completed {
            completed.sort_unstable();
            completed.dedup();
            self.completed = completed;
        }
        if let Some(score) = update.formality_score {
            self.formality_score = Some(score);
        }
    }
}

pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn document_path(&self, user_id: &str) -> Result<PathBuf, ProgressError> {
        let valid = !user_id.is_empty()
            && user_id.len() <= 128
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ProgressError::InvalidUser(user_id.to_string()));
        }
        Ok(self.dir.join(format!("{user_id}.json")))
    }

    /// Progress for `user_id`; a learner with no document has none.
    pub fn load(&self, user_id: &str) -> Result<LessonProgress, ProgressError> {
        let path = self.document_path(user_id)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LessonProgress::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Merge `update` into the stored document and return the result.
    pub fn merge(
        &self,
        user_id: &str,
        update: ProgressUpdate,
    ) -> Result<LessonProgress, ProgressError> {
        let path = self.document_path(user_id)?;
        let mut progress = self.load(user_id)?;
        progress.merge(update);

        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&progress)?)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved progress for {user_id}");
        Ok(progress)
    }

    pub fn mark_completed(
        &self,
        user_id: &str,
        lesson_id: u32,
    ) -> Result<LessonProgress, ProgressError> {
        let current = self.load(user_id)?;
        match current.completion_update(lesson_id) {
            Some(update) => self.merge(user_id, update),
            None => Ok(current),
        }
    }

    pub fn record_formality_score(
        &self,
        user_id: &str,
        correct: u32,
        total: u32,
    ) -> Result<LessonProgress, ProgressError> {
        self.merge(
            user_id,
            ProgressUpdate {
                formality_score: Some(FormalityScore { correct, total }),
                ..ProgressUpdate::default()
            },
        )
    }
}
