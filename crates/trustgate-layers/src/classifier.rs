//! Model-backed detection layers.
//!
//! Both layers wrap the [`ThreatClassifier`] contract; they differ only in
//! role and naming. Either can run without a configured collaborator, in
//! which case it reports [`Detection::Inapplicable`] rather than inventing
//! a verdict.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::collaborators::ThreatClassifier;
use crate::layer::{Detection, DetectionLayer, LayerKind};
use crate::model::{DetectionRequest, LayerResult};

async fn evaluate_classifier(
    kind: LayerKind,
    method: &str,
    classifier: Option<&Arc<dyn ThreatClassifier>>,
    request: &DetectionRequest,
) -> Detection {
    let Some(classifier) = classifier else {
        return Detection::Inapplicable {
            reason: format!("{kind} layer has no classifier configured"),
        };
    };

    match classifier.classify(&request.text).await {
        Ok(verdict) => Detection::Result(LayerResult::new(
            kind.as_str(),
            verdict.is_threat,
            verdict.confidence,
            method,
            verdict.reasoning,
        )),
        Err(err) => {
            warn!(layer = %kind, error = %err, "classifier failed, failing open");
            Detection::Result(LayerResult::degraded(kind.as_str(), err.to_string()))
        }
    }
}

/// Second layer: anomaly scoring in embedding space.
pub struct EmbeddingAnomalyLayer {
    classifier: Option<Arc<dyn ThreatClassifier>>,
}

impl EmbeddingAnomalyLayer {
    pub fn new(classifier: Arc<dyn ThreatClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    /// Layer with no collaborator; evaluates to Inapplicable.
    pub fn unconfigured() -> Self {
        Self { classifier: None }
    }
}

#[async_trait]
impl DetectionLayer for EmbeddingAnomalyLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::EmbeddingAnomaly
    }

    async fn evaluate(&self, request: &DetectionRequest) -> Detection {
        evaluate_classifier(
            self.kind(),
            "embedding_anomaly",
            self.classifier.as_ref(),
            request,
        )
        .await
    }
}

/// Third layer: the expensive external classifier (typically an LLM judge).
pub struct ExternalClassifierLayer {
    classifier: Option<Arc<dyn ThreatClassifier>>,
}

impl ExternalClassifierLayer {
    pub fn new(classifier: Arc<dyn ThreatClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    /// Layer with no collaborator; evaluates to Inapplicable.
    pub fn unconfigured() -> Self {
        Self { classifier: None }
    }
}

#[async_trait]
impl DetectionLayer for ExternalClassifierLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::ExternalClassifier
    }

    async fn evaluate(&self, request: &DetectionRequest) -> Detection {
        evaluate_classifier(
            self.kind(),
            "external_classifier",
            self.classifier.as_ref(),
            request,
        )
        .await
    }
}
