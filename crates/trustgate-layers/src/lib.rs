//! # Trustgate Layers
//!
//! Detection layer contracts and the shared data model for the trustgate
//! threat-classification pipeline.
//!
//! A [`DetectionLayer`] evaluates one request and either produces a
//! [`LayerResult`] or reports itself [`Detection::Inapplicable`] (not
//! configured, disabled). Layers never fail: a broken collaborator yields a
//! degraded fail-open result instead of an error.
//!
//! Three layer variants ship here:
//! - [`PatternBaselineLayer`] over a [`PatternBaseline`] collaborator
//!   (a categorized [`RegexBaseline`] is provided in-crate),
//! - [`EmbeddingAnomalyLayer`] and [`ExternalClassifierLayer`], both over
//!   the [`ThreatClassifier`] contract.
//!
//! [`AdaptiveFastPathMatcher`] short-circuits obvious inputs before any
//! layer runs.

mod baseline;
mod classifier;
mod collaborators;
mod fast_path;
mod layer;
mod model;

pub use baseline::{PatternBaselineLayer, RegexBaseline};
pub use classifier::{EmbeddingAnomalyLayer, ExternalClassifierLayer};
pub use collaborators::{BaselineReport, CollaboratorError, PatternBaseline, ThreatClassifier, Verdict};
pub use fast_path::{AdaptiveFastPathMatcher, FastPathMetrics};
pub use layer::{Detection, DetectionLayer, LayerKind};
pub use model::{
    AgreementLevel, DetectionRequest, EnsembleAnalysis, FusionResult, LayerResult, DEGRADED_FLAG,
};
