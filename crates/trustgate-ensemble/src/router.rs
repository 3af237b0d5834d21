//! Confidence-based routing between detection layers.
//!
//! Most inputs are decided by the cheap baseline layer alone; the router
//! skips the expensive layers whenever the confidence so far makes their
//! answer unlikely to change the verdict.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Confidence thresholds for routing decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// At or below this (non-threat), skip everything downstream.
    pub safe: f64,
    /// At or below this (non-threat), skip only the classifier.
    pub low: f64,
    /// At or above this (threat), run full corroboration.
    pub high: f64,
    /// At or above this (threat), block immediately.
    pub critical: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            safe: 0.05,
            low: 0.20,
            high: 0.85,
            critical: 0.95,
        }
    }
}

/// The confidence band a routing decision landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

/// Which layers to run (or skip) after one layer's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub skip_embedding: bool,
    pub skip_classifier: bool,
    pub skip_output_guard: bool,
    /// True when the verdict is final and no further layer should run.
    pub early_exit: bool,
    pub level: ConfidenceLevel,
    pub reason: String,
}

/// Snapshot of routing counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterStats {
    pub total_routed: u64,
    pub early_exits: u64,
    pub skipped_embedding: u64,
    pub skipped_classifier: u64,
    pub skipped_output_guard: u64,
    pub full_pipeline: u64,
    pub early_exit_rate: f64,
    pub full_pipeline_rate: f64,
}

/// Routes requests through the layer pipeline based on confidence bands.
///
/// `route` itself is pure; the counters are observability only and use
/// relaxed atomics.
pub struct ConfidenceRouter {
    config: RouterConfig,
    total_routed: AtomicU64,
    early_exits: AtomicU64,
    skipped_embedding: AtomicU64,
    skipped_classifier: AtomicU64,
    skipped_output_guard: AtomicU64,
    full_pipeline: AtomicU64,
}

impl ConfidenceRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            total_routed: AtomicU64::new(0),
            early_exits: AtomicU64::new(0),
            skipped_embedding: AtomicU64::new(0),
            skipped_classifier: AtomicU64::new(0),
            skipped_output_guard: AtomicU64::new(0),
            full_pipeline: AtomicU64::new(0),
        }
    }

    /// Decide what to run next given one layer's verdict.
    pub fn route(&self, confidence: f64, is_threat: bool, layer: &str) -> RoutingDecision {
        self.total_routed.fetch_add(1, Ordering::Relaxed);

        let decision = if is_threat && confidence >= self.config.critical {
            self.early_exits.fetch_add(1, Ordering::Relaxed);
            RoutingDecision {
                skip_embedding: true,
                skip_classifier: true,
                skip_output_guard: true,
                early_exit: true,
                level: ConfidenceLevel::Critical,
                reason: format!("critical threat from {layer} (confidence {confidence:.3})"),
            }
        } else if is_threat && confidence >= self.config.high {
            // Likely threat, but corroborate before blocking.
            RoutingDecision {
                skip_embedding: false,
                skip_classifier: false,
                skip_output_guard: false,
                early_exit: false,
                level: ConfidenceLevel::High,
                reason: format!("high-confidence threat from {layer}, corroborating"),
            }
        } else if !is_threat && confidence <= self.config.safe {
            self.early_exits.fetch_add(1, Ordering::Relaxed);
            self.skipped_embedding.fetch_add(1, Ordering::Relaxed);
            self.skipped_classifier.fetch_add(1, Ordering::Relaxed);
            self.skipped_output_guard.fetch_add(1, Ordering::Relaxed);
            RoutingDecision {
                skip_embedding: true,
                skip_classifier: true,
                skip_output_guard: true,
                early_exit: true,
                level: ConfidenceLevel::Safe,
                reason: format!("very low threat confidence from {layer} (confidence {confidence:.3})"),
            }
        } else if !is_threat && confidence <= self.config.low {
            self.skipped_classifier.fetch_add(1, Ordering::Relaxed);
            RoutingDecision {
                skip_embedding: false,
                skip_classifier: true,
                skip_output_guard: false,
                early_exit: false,
                level: ConfidenceLevel::Low,
                reason: format!("low confidence from {layer}, running embedding check only"),
            }
        } else {
            self.full_pipeline.fetch_add(1, Ordering::Relaxed);
            RoutingDecision {
                skip_embedding: false,
                skip_classifier: false,
                skip_output_guard: false,
                early_exit: false,
                level: ConfidenceLevel::Medium,
                reason: format!("ambiguous confidence from {layer}, running full pipeline"),
            }
        };

        debug!(level = ?decision.level, layer, confidence, "routing decision");
        decision
    }

    pub fn stats(&self) -> RouterStats {
        let total = self.total_routed.load(Ordering::Relaxed);
        let early_exits = self.early_exits.load(Ordering::Relaxed);
        let full_pipeline = self.full_pipeline.load(Ordering::Relaxed);
        RouterStats {
            total_routed: total,
            early_exits,
            skipped_embedding: self.skipped_embedding.load(Ordering::Relaxed),
            skipped_classifier: self.skipped_classifier.load(Ordering::Relaxed),
            skipped_output_guard: self.skipped_output_guard.load(Ordering::Relaxed),
            full_pipeline,
            early_exit_rate: if total == 0 {
                0.0
            } else {
                early_exits as f64 / total as f64
            },
            full_pipeline_rate: if total == 0 {
                0.0
            } else {
                full_pipeline as f64 / total as f64
            },
        }
    }
}

impl Default for ConfidenceRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}
