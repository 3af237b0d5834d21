//! The detection orchestrator.
//!
//! Sequences one classification request through the pipeline: cache
//! lookup, fast path, pattern baseline, confidence routing, the gated
//! model-backed layers, ensemble fusion, cache write. `classify` is
//! infallible; every failure inside the pipeline degrades instead of
//! propagating.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use trustgate_cache::{
    CacheMetrics, DedupMetrics, MultiTierCache, MultiTierCacheBuilder, RequestDeduplicator,
    SharedCacheStore, TextEmbedder,
};
use trustgate_ensemble::{
    AnalyzerStats, ConfidenceLevel, ConfidenceRouter, EnsembleDisagreementAnalyzer, RouterStats,
    RoutingDecision,
};
use trustgate_layers::{
    AdaptiveFastPathMatcher, Detection, DetectionLayer, DetectionRequest, EmbeddingAnomalyLayer,
    ExternalClassifierLayer, FastPathMetrics, FusionResult, LayerKind, LayerResult,
    PatternBaseline, PatternBaselineLayer, RegexBaseline, ThreatClassifier,
};

use crate::config::TrustgateConfig;

/// Aggregate pipeline metrics, one snapshot per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub cache: CacheMetrics,
    pub dedup: DedupMetrics,
    pub fast_path: FastPathMetrics,
    pub router: RouterStats,
    pub ensemble: AnalyzerStats,
}

/// Builder wiring collaborators into a [`DetectionOrchestrator`].
///
/// Every collaborator is optional: without an embedder L2 is disabled,
/// without a store L3 is disabled, without classifiers the corresponding
/// layers report themselves inapplicable. The pattern baseline defaults
/// to the in-crate [`RegexBaseline`].
pub struct DetectionOrchestratorBuilder {
    config: TrustgateConfig,
    baseline: Option<Arc<dyn PatternBaseline>>,
    embedding_classifier: Option<Arc<dyn ThreatClassifier>>,
    external_classifier: Option<Arc<dyn ThreatClassifier>>,
    embedder: Option<Arc<dyn TextEmbedder>>,
    store: Option<Arc<dyn SharedCacheStore>>,
}

impl DetectionOrchestratorBuilder {
    pub fn new(config: TrustgateConfig) -> Self {
        Self {
            config,
            baseline: None,
            embedding_classifier: None,
            external_classifier: None,
            embedder: None,
            store: None,
        }
    }

    pub fn baseline(mut self, baseline: Arc<dyn PatternBaseline>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn embedding_classifier(mut self, classifier: Arc<dyn ThreatClassifier>) -> Self {
        self.embedding_classifier = Some(classifier);
        self
    }

    pub fn external_classifier(mut self, classifier: Arc<dyn ThreatClassifier>) -> Self {
        self.external_classifier = Some(classifier);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn store(mut self, store: Arc<dyn SharedCacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> DetectionOrchestrator {
        let global = &self.config.global;

        let mut cache_builder = MultiTierCacheBuilder::new()
            .l1_capacity(self.config.cache.l1_capacity)
            .l2_capacity(self.config.cache.l2_capacity)
            .l2_threshold(self.config.cache.l2_similarity_threshold)
            .l3_ttl_secs(self.config.cache.l3_ttl_secs)
            .max_input_chars(global.max_input_chars);
        if let Some(embedder) = self.embedder {
            cache_builder = cache_builder.embedder(embedder);
        }
        if self.config.cache.l3_enabled {
            if let Some(store) = self.store {
                cache_builder = cache_builder.store(store);
            }
        }

        let embedding = match self.embedding_classifier {
            Some(classifier) => EmbeddingAnomalyLayer::new(classifier),
            None => EmbeddingAnomalyLayer::unconfigured(),
        };
        let classifier = match self.external_classifier {
            Some(classifier) => ExternalClassifierLayer::new(classifier),
            None => ExternalClassifierLayer::unconfigured(),
        };

        info!(
            fast_path = global.fast_path_enabled,
            call_timeout_ms = global.call_timeout_ms,
            "detection orchestrator initialized"
        );
        DetectionOrchestrator {
            cache: cache_builder.build(),
            dedup: RequestDeduplicator::new(global.max_input_chars),
            fast_path: AdaptiveFastPathMatcher::new(global.fast_path_enabled),
            router: ConfidenceRouter::new(self.config.router.clone()),
            analyzer: EnsembleDisagreementAnalyzer::new(self.config.ensemble.clone()),
            baseline: PatternBaselineLayer::new(
                self.baseline.unwrap_or_else(|| Arc::new(RegexBaseline::new())),
            ),
            embedding,
            classifier,
            call_timeout: Duration::from_millis(global.call_timeout_ms),
            max_input_chars: global.max_input_chars,
        }
    }
}

/// Sequences detection layers per request and fuses their verdicts.
pub struct DetectionOrchestrator {
    cache: MultiTierCache<FusionResult>,
    dedup: RequestDeduplicator<FusionResult>,
    fast_path: AdaptiveFastPathMatcher,
    router: ConfidenceRouter,
    analyzer: EnsembleDisagreementAnalyzer,
    baseline: PatternBaselineLayer,
    embedding: EmbeddingAnomalyLayer,
    classifier: ExternalClassifierLayer,
    call_timeout: Duration,
    max_input_chars: usize,
}

impl DetectionOrchestrator {
    /// Orchestrator with default config and no external collaborators.
    pub fn with_defaults() -> Self {
        DetectionOrchestratorBuilder::new(TrustgateConfig::default()).build()
    }

    pub fn builder(config: TrustgateConfig) -> DetectionOrchestratorBuilder {
        DetectionOrchestratorBuilder::new(config)
    }

    /// Classify one request. Infallible: the worst outcome of any internal
    /// failure is a low-confidence benign verdict.
    pub async fn classify(&self, request: &DetectionRequest) -> FusionResult {
        let text = self.normalize(&request.text);

        if let Some((cached, tier)) = self.cache.get(&text).await {
            debug!(?tier, "classification served from cache");
            return cached;
        }

        if let Some(result) = self.fast_path.check(&text) {
            self.cache.set(&text, result.clone()).await;
            return result;
        }

        let normalized = DetectionRequest {
            text: text.clone(),
            context: request.context.clone(),
        };

        let baseline = match self.run_layer(&self.baseline, &normalized).await {
            Detection::Result(result) => result,
            Detection::Inapplicable { reason } => {
                LayerResult::degraded(LayerKind::PatternBaseline.as_str(), reason)
            }
        };

        let decision = self.route_baseline(&baseline);

        let result = if decision.early_exit {
            self.early_exit_result(&baseline, &decision)
        } else {
            self.run_gated_layers(baseline, &decision, &normalized).await
        };

        self.cache.set(&text, result.clone()).await;
        result
    }

    /// Classify, sharing in-flight work with concurrent identical requests.
    pub async fn classify_deduplicated(self: &Arc<Self>, request: DetectionRequest) -> FusionResult {
        let text = request.text.clone();
        let this = Arc::clone(self);
        match self
            .dedup
            .execute(&text, move || async move {
                Ok::<_, std::convert::Infallible>(this.classify(&request).await)
            })
            .await
        {
            Ok(result) => (*result).clone(),
            // classify is infallible, so this is a panic or a lost channel.
            Err(err) => FusionResult::benign_fallback(format!("deduplicated run failed: {err}")),
        }
    }

    /// Drop the process-local cache tiers.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn metrics(&self) -> OrchestratorMetrics {
        OrchestratorMetrics {
            cache: self.cache.metrics(),
            dedup: self.dedup.metrics(),
            fast_path: self.fast_path.metrics(),
            router: self.router.stats(),
            ensemble: self.analyzer.stats(),
        }
    }

    fn normalize(&self, text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.chars().count() <= self.max_input_chars {
            trimmed.to_string()
        } else {
            trimmed.chars().take(self.max_input_chars).collect()
        }
    }

    /// Routing keys off the baseline verdict alone. A degraded baseline
    /// carries no signal, so the router is never consulted; everything runs.
    fn route_baseline(&self, baseline: &LayerResult) -> RoutingDecision {
        if baseline.is_degraded() {
            full_pipeline_decision()
        } else {
            self.router
                .route(baseline.confidence, baseline.is_threat, &baseline.layer)
        }
    }

    async fn run_layer(&self, layer: &dyn DetectionLayer, request: &DetectionRequest) -> Detection {
        match tokio::time::timeout(self.call_timeout, layer.evaluate(request)).await {
            Ok(detection) => detection,
            Err(_) => Detection::Result(LayerResult::degraded(
                layer.kind().as_str(),
                "collaborator call timed out",
            )),
        }
    }

    async fn run_gated_layers(
        &self,
        baseline: LayerResult,
        decision: &RoutingDecision,
        request: &DetectionRequest,
    ) -> FusionResult {
        let mut results = vec![baseline];

        if !decision.skip_embedding {
            if let Some(result) = self.run_layer(&self.embedding, request).await.into_result() {
                results.push(result);
            }
        }
        if !decision.skip_classifier {
            if let Some(result) = self.run_layer(&self.classifier, request).await.into_result() {
                results.push(result);
            }
        }

        // Degraded results carry no verdict; fusing them would count each
        // failure as a confident-zero safe vote.
        let healthy: Vec<LayerResult> = results
            .iter()
            .filter(|r| !r.is_degraded())
            .cloned()
            .collect();
        if healthy.is_empty() {
            let reasons: Vec<&str> = results.iter().map(|r| r.reason.as_str()).collect();
            return FusionResult::benign_fallback(format!(
                "all detection layers degraded: {}",
                reasons.join("; ")
            ));
        }
        self.analyzer.analyze(&healthy)
    }

    fn early_exit_result(&self, baseline: &LayerResult, decision: &RoutingDecision) -> FusionResult {
        FusionResult {
            is_threat: baseline.is_threat,
            threat_type: if baseline.is_threat {
                baseline
                    .threat_category()
                    .unwrap_or_else(|| "prompt_injection".to_string())
            } else {
                "none".to_string()
            },
            confidence: baseline.confidence,
            reasoning: format!("{} | {}", decision.reason, baseline.reason),
            detection_method: baseline.method.clone(),
            layers_executed: vec![baseline.layer.clone()],
            ensemble: None,
        }
    }
}

/// Run-everything decision used when the baseline itself is degraded.
fn full_pipeline_decision() -> RoutingDecision {
    RoutingDecision {
        skip_embedding: false,
        skip_classifier: false,
        skip_output_guard: false,
        early_exit: false,
        level: ConfidenceLevel::Medium,
        reason: "baseline degraded, running full pipeline".to_string(),
    }
}
