//! Ensemble fusion with disagreement analysis.
//!
//! Fuses the verdicts of the layers that ran into one [`FusionResult`].
//! Disagreement between layers is itself a signal: an adversarial input
//! crafted to slip past one model often trips another, and the resulting
//! split is worth escalating even when the weighted vote lands "safe".

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use trustgate_layers::{AgreementLevel, EnsembleAnalysis, FusionResult, LayerResult};

/// Ensemble tuning knobs.
///
/// The default constants are empirical, not derived; they are configuration
/// rather than law.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Disagreement at or above this counts as significant.
    pub disagreement_threshold: f64,
    /// Disagreement at or above this triggers escalation.
    pub escalation_threshold: f64,
    /// Fewer results than this degenerate to pass-through.
    pub min_layers: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            disagreement_threshold: 0.4,
            escalation_threshold: 0.6,
            min_layers: 2,
        }
    }
}

/// Snapshot of analyzer counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerStats {
    pub total_analyses: u64,
    pub high_disagreement: u64,
    pub escalated: u64,
    pub unanimous_safe: u64,
    pub unanimous_threat: u64,
    pub high_disagreement_rate: f64,
    pub escalation_rate: f64,
}

/// Fuses layer results and scores their disagreement.
pub struct EnsembleDisagreementAnalyzer {
    config: EnsembleConfig,
    total_analyses: AtomicU64,
    high_disagreement: AtomicU64,
    escalated: AtomicU64,
    unanimous_safe: AtomicU64,
    unanimous_threat: AtomicU64,
}

impl EnsembleDisagreementAnalyzer {
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            total_analyses: AtomicU64::new(0),
            high_disagreement: AtomicU64::new(0),
            escalated: AtomicU64::new(0),
            unanimous_safe: AtomicU64::new(0),
            unanimous_threat: AtomicU64::new(0),
        }
    }

    /// Fuse layer results into a final verdict.
    ///
    /// With fewer than `min_layers` results this degenerates to a
    /// pass-through of the single result, or a benign fallback when no
    /// layer produced anything at all.
    pub fn analyze(&self, results: &[LayerResult]) -> FusionResult {
        self.total_analyses.fetch_add(1, Ordering::Relaxed);

        if results.len() < self.config.min_layers {
            return self.degenerate(results);
        }

        let threat_votes = results.iter().filter(|r| r.is_threat).count();
        let safe_votes = results.len() - threat_votes;

        let disagreement = self.disagreement_score(results);
        let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
        let avg_confidence = mean(&confidences);
        let confidence_variance = variance(&confidences);

        let (is_threat, confidence) = self.weighted_vote(results, disagreement);
        let should_escalate =
            self.should_escalate(disagreement, confidence_variance, threat_votes, safe_votes);

        if disagreement >= self.config.disagreement_threshold {
            self.high_disagreement.fetch_add(1, Ordering::Relaxed);
        }
        if should_escalate {
            self.escalated.fetch_add(1, Ordering::Relaxed);
        }
        if threat_votes == results.len() {
            self.unanimous_threat.fetch_add(1, Ordering::Relaxed);
        }
        if safe_votes == results.len() {
            self.unanimous_safe.fetch_add(1, Ordering::Relaxed);
        }

        let reasoning = self.reasoning(results, disagreement, is_threat, should_escalate);
        debug!(
            threat_votes,
            safe_votes, disagreement, is_threat, "ensemble analysis"
        );

        FusionResult {
            is_threat,
            threat_type: if is_threat {
                threat_type_of(results)
            } else {
                "none".to_string()
            },
            confidence,
            reasoning,
            detection_method: "ensemble".to_string(),
            layers_executed: results.iter().map(|r| r.layer.clone()).collect(),
            ensemble: Some(EnsembleAnalysis {
                disagreement_score: disagreement,
                agreement_level: AgreementLevel::from_disagreement(disagreement),
                threat_votes,
                safe_votes,
                avg_confidence,
                confidence_variance,
                should_escalate,
            }),
        }
    }

    pub fn stats(&self) -> AnalyzerStats {
        let total = self.total_analyses.load(Ordering::Relaxed);
        let high_disagreement = self.high_disagreement.load(Ordering::Relaxed);
        let escalated = self.escalated.load(Ordering::Relaxed);
        AnalyzerStats {
            total_analyses: total,
            high_disagreement,
            escalated,
            unanimous_safe: self.unanimous_safe.load(Ordering::Relaxed),
            unanimous_threat: self.unanimous_threat.load(Ordering::Relaxed),
            high_disagreement_rate: rate(high_disagreement, total),
            escalation_rate: rate(escalated, total),
        }
    }

    fn degenerate(&self, results: &[LayerResult]) -> FusionResult {
        let Some(result) = results.first() else {
            return FusionResult::benign_fallback("no layer results available");
        };
        let threat_votes = usize::from(result.is_threat);
        FusionResult {
            is_threat: result.is_threat,
            threat_type: if result.is_threat {
                threat_type_of(std::slice::from_ref(result))
            } else {
                "none".to_string()
            },
            confidence: result.confidence,
            reasoning: format!("single layer ({}): {}", result.layer, result.reason),
            detection_method: "single_layer".to_string(),
            layers_executed: vec![result.layer.clone()],
            ensemble: Some(EnsembleAnalysis {
                disagreement_score: 0.0,
                agreement_level: AgreementLevel::High,
                threat_votes,
                safe_votes: 1 - threat_votes,
                avg_confidence: result.confidence,
                confidence_variance: 0.0,
                should_escalate: false,
            }),
        }
    }

    /// Disagreement in [0, 1]: vote split, confidence spread, and
    /// confident-but-contradictory pairs, weighted 0.5/0.3/0.2.
    fn disagreement_score(&self, results: &[LayerResult]) -> f64 {
        let threat_votes = results.iter().filter(|r| r.is_threat).count();
        let vote_ratio = threat_votes as f64 / results.len() as f64;
        // Maximal at a 50/50 split.
        let vote_disagreement = 1.0 - (vote_ratio - 0.5).abs() * 2.0;

        let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
        // A variance of 0.25 (std dev 0.5) is as spread as verdict
        // confidences realistically get.
        let confidence_disagreement = (variance(&confidences) / 0.25).min(1.0);

        let mut extreme_disagreement = 0.0;
        'outer: for (i, a) in results.iter().enumerate() {
            for b in &results[i + 1..] {
                if a.is_threat != b.is_threat && a.confidence > 0.8 && b.confidence > 0.8 {
                    extreme_disagreement = 1.0;
                    break 'outer;
                }
            }
        }

        0.5 * vote_disagreement + 0.3 * confidence_disagreement + 0.2 * extreme_disagreement
    }

    /// Confidence-weighted vote, discounted by disagreement.
    fn weighted_vote(&self, results: &[LayerResult], disagreement: f64) -> (bool, f64) {
        let total_weight: f64 = results.iter().map(|r| r.confidence).sum();
        if total_weight == 0.0 {
            // Nothing to weigh by; fall back to simple majority.
            let threat_votes = results.iter().filter(|r| r.is_threat).count();
            return (threat_votes * 2 > results.len(), 0.5);
        }

        let threat_weight: f64 = results
            .iter()
            .filter(|r| r.is_threat)
            .map(|r| r.confidence)
            .sum();
        let threat_score = threat_weight / total_weight;
        let adjusted = threat_score * (1.0 - disagreement * 0.3);
        (adjusted >= 0.5, adjusted.clamp(0.0, 1.0))
    }

    fn should_escalate(
        &self,
        disagreement: f64,
        confidence_variance: f64,
        threat_votes: usize,
        safe_votes: usize,
    ) -> bool {
        if disagreement >= self.config.escalation_threshold {
            return true;
        }
        if confidence_variance > 0.15 && threat_votes.min(safe_votes) > 0 {
            return true;
        }
        let total = threat_votes + safe_votes;
        if total >= 3 {
            let minority_fraction = threat_votes.min(safe_votes) as f64 / total as f64;
            if (0.3..=0.5).contains(&minority_fraction) {
                return true;
            }
        }
        false
    }

    fn reasoning(
        &self,
        results: &[LayerResult],
        disagreement: f64,
        is_threat: bool,
        should_escalate: bool,
    ) -> String {
        let threat_votes = results.iter().filter(|r| r.is_threat).count();
        let mut parts = vec![format!(
            "ensemble of {} layers: {} detected threat, {} detected safe",
            results.len(),
            threat_votes,
            results.len() - threat_votes
        )];

        if disagreement >= 0.6 {
            parts.push(format!("HIGH disagreement (score {disagreement:.3})"));
        } else if disagreement >= 0.3 {
            parts.push(format!("MEDIUM disagreement (score {disagreement:.3})"));
        }

        let threat_layers: Vec<&str> = results
            .iter()
            .filter(|r| r.is_threat)
            .map(|r| r.layer.as_str())
            .collect();
        if !threat_layers.is_empty() {
            parts.push(format!("threat detected by: {}", threat_layers.join(", ")));
        }

        if should_escalate {
            parts.push("escalated for review due to layer disagreement".to_string());
        }

        parts.push(format!(
            "final decision: {}",
            if is_threat { "THREAT" } else { "SAFE" }
        ));
        parts.join(" | ")
    }
}

impl Default for EnsembleDisagreementAnalyzer {
    fn default() -> Self {
        Self::new(EnsembleConfig::default())
    }
}

/// Threat category from the first threat-voting layer's metadata.
fn threat_type_of(results: &[LayerResult]) -> String {
    results
        .iter()
        .filter(|r| r.is_threat)
        .find_map(LayerResult::threat_category)
        .unwrap_or_else(|| "prompt_injection".to_string())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn rate(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(layer: &str, is_threat: bool, confidence: f64) -> LayerResult {
        LayerResult::new(layer, is_threat, confidence, "test", "test verdict")
    }

    #[test]
    fn test_unanimous_safe_low_disagreement() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[
            result("pattern_baseline", false, 0.05),
            result("embedding_anomaly", false, 0.10),
            result("external_classifier", false, 0.08),
        ]);

        assert!(!fused.is_threat);
        assert_eq!(fused.threat_type, "none");
        let ensemble = fused.ensemble.unwrap();
        assert!(ensemble.disagreement_score < 0.3);
        assert_eq!(ensemble.agreement_level, AgreementLevel::High);
        assert!(!ensemble.should_escalate);
    }

    #[test]
    fn test_unanimous_threat() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[
            result("pattern_baseline", true, 0.95),
            result("external_classifier", true, 0.90),
        ]);

        assert!(fused.is_threat);
        assert!(fused.confidence > 0.8);
        let ensemble = fused.ensemble.unwrap();
        assert_eq!(ensemble.threat_votes, 2);
        assert!(!ensemble.should_escalate);
        assert_eq!(analyzer.stats().unanimous_threat, 1);
    }

    #[test]
    fn test_confident_split_escalates() {
        // Two layers disagree, both confident: extreme disagreement.
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[
            result("pattern_baseline", true, 0.9),
            result("embedding_anomaly", false, 0.9),
        ]);

        let ensemble = fused.ensemble.unwrap();
        // 50/50 split (0.5) + no variance + extreme pair (0.2) = 0.7.
        assert!((ensemble.disagreement_score - 0.7).abs() < 1e-9);
        assert_eq!(ensemble.agreement_level, AgreementLevel::Low);
        assert!(ensemble.should_escalate);
    }

    #[test]
    fn test_close_split_of_three_escalates() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[
            result("a", true, 0.6),
            result("b", false, 0.55),
            result("c", false, 0.6),
        ]);

        let ensemble = fused.ensemble.unwrap();
        assert!(ensemble.should_escalate, "1-of-3 minority is a close split");
    }

    #[test]
    fn test_weighted_vote_favors_confident_layers() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        // One confident threat vote outweighs two weak safe votes.
        let fused = analyzer.analyze(&[
            result("a", true, 0.95),
            result("b", false, 0.1),
            result("c", false, 0.1),
        ]);
        assert!(fused.is_threat);
    }

    #[test]
    fn test_zero_weight_falls_back_to_majority() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[
            result("a", true, 0.0),
            result("b", true, 0.0),
            result("c", false, 0.0),
        ]);
        assert!(fused.is_threat);
        assert!((fused.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_result_passes_through() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[result("pattern_baseline", true, 0.95)]);

        assert!(fused.is_threat);
        assert!((fused.confidence - 0.95).abs() < f64::EPSILON);
        assert_eq!(fused.detection_method, "single_layer");
        assert_eq!(fused.layers_executed, vec!["pattern_baseline".to_string()]);
    }

    #[test]
    fn test_empty_results_benign_fallback() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[]);
        assert!(!fused.is_threat);
        assert_eq!(fused.detection_method, "fallback");
    }

    #[test]
    fn test_threat_type_from_metadata() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let baseline = result("pattern_baseline", true, 0.95)
            .with_metadata("threats", "system_prompt_attack,prompt_injection");
        let fused = analyzer.analyze(&[baseline, result("b", true, 0.9)]);
        assert_eq!(fused.threat_type, "system_prompt_attack");
    }

    #[test]
    fn test_threat_type_default() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[result("a", true, 0.95), result("b", true, 0.9)]);
        assert_eq!(fused.threat_type, "prompt_injection");
    }

    #[test]
    fn test_disagreement_discounts_confidence() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        let fused = analyzer.analyze(&[
            result("a", true, 0.85),
            result("b", false, 0.85),
        ]);
        // Weighted threat score is 0.5; the disagreement penalty pushes the
        // adjusted confidence below the 0.5 threshold, so the verdict lands
        // safe but escalated.
        assert!(!fused.is_threat);
        assert!(fused.ensemble.unwrap().should_escalate);
    }

    #[test]
    fn test_stats_counters() {
        let analyzer = EnsembleDisagreementAnalyzer::default();
        analyzer.analyze(&[result("a", false, 0.05), result("b", false, 0.05)]);
        analyzer.analyze(&[result("a", true, 0.9), result("b", false, 0.9)]);

        let stats = analyzer.stats();
        assert_eq!(stats.total_analyses, 2);
        assert_eq!(stats.unanimous_safe, 1);
        assert_eq!(stats.escalated, 1);
        assert!((stats.escalation_rate - 0.5).abs() < f64::EPSILON);
    }
}
