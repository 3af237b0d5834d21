//! Shared data model for the detection pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key marking a fail-open result from a broken collaborator.
///
/// Downstream routing must never treat a degraded "not a threat" as a
/// confident safe verdict.
pub const DEGRADED_FLAG: &str = "degraded";

/// A classification request: the untrusted text plus optional context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub text: String,
    pub context: BTreeMap<String, String>,
}

impl DetectionRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry (caller identity, channel, etc).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// One layer's verdict on a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerResult {
    /// Name of the layer that produced this result.
    pub layer: String,
    pub is_threat: bool,
    /// Threat confidence in [0, 1]; clamped on construction.
    pub confidence: f64,
    /// How the verdict was reached (e.g. `regex_baseline`, `fail_open`).
    pub method: String,
    pub reason: String,
    pub metadata: BTreeMap<String, String>,
}

impl LayerResult {
    /// Build a result, clamping confidence into [0, 1].
    ///
    /// Collaborators are outside this crate's control; a confidence of 1.3
    /// or NaN from a misbehaving one is coerced rather than trusted.
    pub fn new(
        layer: impl Into<String>,
        is_threat: bool,
        confidence: f64,
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            layer: layer.into(),
            is_threat,
            confidence,
            method: method.into(),
            reason: reason.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Fail-open result for a layer whose collaborator is broken.
    pub fn degraded(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut result = Self::new(layer, false, 0.0, "fail_open", reason);
        result
            .metadata
            .insert(DEGRADED_FLAG.to_string(), "true".to_string());
        result
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Threat category carried in metadata, if the producing layer set one.
    ///
    /// The baseline layer stores matched categories under `threats`;
    /// other layers may set a single `threat_type`.
    pub fn threat_category(&self) -> Option<String> {
        if let Some(threats) = self.metadata.get("threats") {
            if let Some(first) = threats.split(',').find(|t| !t.is_empty()) {
                return Some(first.to_string());
            }
        }
        self.metadata
            .get("threat_type")
            .filter(|t| !t.is_empty())
            .cloned()
    }

    /// True when this result came from a fail-open branch.
    pub fn is_degraded(&self) -> bool {
        self.metadata
            .get(DEGRADED_FLAG)
            .is_some_and(|v| v == "true")
    }
}

/// How strongly the layers agree, derived from the disagreement score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    High,
    Medium,
    Low,
}

impl AgreementLevel {
    /// Band a disagreement score: high agreement below 0.3, medium below
    /// 0.6, low at or above.
    pub fn from_disagreement(score: f64) -> Self {
        if score < 0.3 {
            Self::High
        } else if score < 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Ensemble vote statistics attached to a fused verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleAnalysis {
    pub disagreement_score: f64,
    pub agreement_level: AgreementLevel,
    pub threat_votes: usize,
    pub safe_votes: usize,
    pub avg_confidence: f64,
    pub confidence_variance: f64,
    /// True when the layers conflict enough that a human (or a stronger
    /// model) should review the verdict.
    pub should_escalate: bool,
}

/// The pipeline's final verdict for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionResult {
    pub is_threat: bool,
    /// Threat category, `"none"` for benign verdicts.
    pub threat_type: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Which mechanism produced the verdict (`fast_path_safe`, `cached`,
    /// `ensemble`, `single_layer`, ...).
    pub detection_method: String,
    pub layers_executed: Vec<String>,
    pub ensemble: Option<EnsembleAnalysis>,
}

impl FusionResult {
    /// Low-confidence benign verdict used when every layer failed.
    ///
    /// Blocking traffic because the detector fleet is down would turn an
    /// availability incident into an outage, so the pipeline fails open
    /// and says so in the reasoning.
    pub fn benign_fallback(reason: impl Into<String>) -> Self {
        Self {
            is_threat: false,
            threat_type: "none".to_string(),
            confidence: 0.1,
            reasoning: reason.into(),
            detection_method: "fallback".to_string(),
            layers_executed: Vec::new(),
            ensemble: None,
        }
    }
}
