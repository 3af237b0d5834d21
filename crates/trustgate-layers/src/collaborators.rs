//! Contracts for external detection collaborators.
//!
//! The pipeline does not know how threats are actually recognized; it
//! orchestrates collaborators behind these traits. Implementations may be
//! in-process (the regex baseline) or remote (embedding services, LLM
//! classifiers), and the remote ones are expected to fail sometimes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of an external collaborator call.
///
/// Clone so a single failure can be embedded in several fail-open results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator call timed out")]
    Timeout,
    #[error("malformed collaborator response: {0}")]
    Malformed(String),
}

/// What the pattern baseline found in one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineReport {
    /// Matched threat categories, empty when clean.
    pub categories: Vec<String>,
    /// 0 benign, 1 low/medium, 3 high.
    pub severity: u8,
}

impl BaselineReport {
    pub fn clean() -> Self {
        Self {
            categories: Vec::new(),
            severity: 0,
        }
    }

    pub fn is_threat(&self) -> bool {
        self.severity > 0
    }
}

/// Fast in-process pattern matching over raw text.
///
/// Synchronous on purpose: implementations are expected to be local and
/// cheap (a regex table), not network calls.
pub trait PatternBaseline: Send + Sync {
    fn check(&self, text: &str) -> BaselineReport;
}

/// A classifier's verdict on one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub is_threat: bool,
    pub confidence: f64,
    pub reasoning: String,
}

/// External model-backed classifier (embedding anomaly scorer, LLM judge).
#[async_trait]
pub trait ThreatClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Verdict, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_report() {
        let report = BaselineReport::clean();
        assert!(!report.is_threat());
        assert_eq!(report.severity, 0);
    }

    #[test]
    fn test_error_is_cloneable() {
        let err = CollaboratorError::Unavailable("conn refused".into());
        let copy = err.clone();
        assert_eq!(err, copy);
        assert_eq!(copy.to_string(), "collaborator unavailable: conn refused");
    }
}
