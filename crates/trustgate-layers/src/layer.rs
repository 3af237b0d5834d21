//! The detection layer contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{DetectionRequest, LayerResult};

/// The three layer roles in the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    PatternBaseline,
    EmbeddingAnomaly,
    ExternalClassifier,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternBaseline => "pattern_baseline",
            Self::EmbeddingAnomaly => "embedding_anomaly",
            Self::ExternalClassifier => "external_classifier",
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of asking a layer to evaluate a request.
///
/// A layer that cannot run at all (no collaborator configured, disabled by
/// config) reports `Inapplicable` so the fusion step can tell "no opinion"
/// apart from "confidently safe". Collaborator *failures* are not
/// Inapplicable; those fail open as a degraded [`LayerResult`].
#[derive(Debug, Clone)]
pub enum Detection {
    Result(LayerResult),
    Inapplicable { reason: String },
}

impl Detection {
    pub fn into_result(self) -> Option<LayerResult> {
        match self {
            Self::Result(result) => Some(result),
            Self::Inapplicable { .. } => None,
        }
    }
}

/// One stage of the detection pipeline.
#[async_trait]
pub trait DetectionLayer: Send + Sync {
    /// Which pipeline role this layer fills.
    fn kind(&self) -> LayerKind;

    /// Evaluate a request. Never fails: collaborator errors fail open as
    /// degraded results.
    async fn evaluate(&self, request: &DetectionRequest) -> Detection;
}
