//! Append-only log of attacks the input guard missed.
//!
//! Whenever the output guard blocks something the input guard allowed,
//! the shield records a [`FailureExample`]. The log is the training feed
//! for the next iteration of the input guard; records are appended as one
//! JSON object per line and never edited.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One input-guard miss caught by the output guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureExample {
    pub user_input: String,
    /// Always `"true"`; these records only exist for misses.
    pub threat_detected: String,
    pub threat_type: String,
    pub reasoning: String,
    pub model_output: String,
    pub violation_type: String,
    pub violation_details: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureExample {
    pub fn new(
        user_input: impl Into<String>,
        threat_type: impl Into<String>,
        model_output: impl Into<String>,
        violation_type: impl Into<String>,
        violation_details: impl Into<String>,
    ) -> Self {
        let violation_details = violation_details.into();
        Self {
            user_input: user_input.into(),
            threat_detected: "true".to_string(),
            threat_type: threat_type.into(),
            reasoning: violation_details.clone(),
            model_output: model_output.into(),
            violation_type: violation_type.into(),
            violation_details,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only JSONL failure log with an in-memory drain buffer.
pub struct FailureLog {
    path: PathBuf,
    pending: Mutex<Vec<FailureExample>>,
}

impl FailureLog {
    /// Open (creating parent directories as needed) a failure log at `path`.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Append one example to disk and to the in-memory drain buffer.
    pub fn append(&self, example: FailureExample) -> std::io::Result<()> {
        let line = serde_json::to_string(&example)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        self.pending
            .lock()
            .expect("failure log lock poisoned")
            .push(example);
        info!(path = %self.path.display(), "failure example recorded");
        Ok(())
    }

    /// Hand the accumulated failures to a retraining pass, emptying the
    /// in-memory buffer. The on-disk log is untouched.
    pub fn drain_failures(&self) -> Vec<FailureExample> {
        std::mem::take(&mut *self.pending.lock().expect("failure log lock poisoned"))
    }

    /// Number of failures recorded since the last drain.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("failure log lock poisoned").len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
