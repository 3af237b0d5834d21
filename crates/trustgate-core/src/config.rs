//! Configuration types for the trustgate pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use trustgate_ensemble::{EnsembleConfig, RouterConfig};
use trustgate_spotlight::DelimiterStyle;

/// Configuration for the full detection pipeline and shield.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustgateConfig {
    /// Confidence router thresholds.
    pub router: RouterConfig,

    /// Cache tier sizing and toggles.
    pub cache: CacheConfig,

    /// Ensemble fusion tuning.
    pub ensemble: EnsembleConfig,

    /// Spotlighting style and strictness.
    pub spotlight: SpotlightConfig,

    /// Shield execution mode.
    pub execution_mode: ExecutionMode,

    /// Global settings.
    pub global: GlobalConfig,
}

/// Cache tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// L1 exact-match LRU capacity.
    pub l1_capacity: usize,

    /// L2 similarity cache capacity.
    pub l2_capacity: usize,

    /// Cosine similarity threshold for an L2 hit.
    pub l2_similarity_threshold: f32,

    /// Whether to use the shared L3 store when one is provided.
    pub l3_enabled: bool,

    /// TTL for L3 entries, in seconds.
    pub l3_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 1024,
            l2_capacity: 1000,
            l2_similarity_threshold: 0.95,
            l3_enabled: true,
            l3_ttl_secs: 3600,
        }
    }
}

/// Spotlighting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotlightConfig {
    pub style: DelimiterStyle,

    /// Prepend delimiter-handling guidance to the system prompt.
    pub add_instructions: bool,

    /// Add strict warnings about boundary manipulation.
    pub strict_mode: bool,
}

impl Default for SpotlightConfig {
    fn default() -> Self {
        Self {
            style: DelimiterStyle::default(),
            add_instructions: true,
            strict_mode: true,
        }
    }
}

/// How the shield schedules input guard and protected logic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Input guard completes before the protected logic starts.
    #[default]
    Sequential,
    /// Protected logic starts concurrently with the input guard and is
    /// aborted if the guard blocks.
    Speculative,
}

/// Global pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Enable the fast-path matcher for obvious inputs.
    pub fast_path_enabled: bool,

    /// Timeout applied to each external collaborator call, in ms.
    pub call_timeout_ms: u64,

    /// Input is trimmed and truncated to this many characters.
    pub max_input_chars: usize,

    /// Where output-guard failures are appended for later retraining.
    pub failure_log_path: PathBuf,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            fast_path_enabled: true,
            call_timeout_ms: 5_000,
            max_input_chars: trustgate_cache::DEFAULT_MAX_INPUT_CHARS,
            failure_log_path: PathBuf::from("./failures_production.jsonl"),
        }
    }
}
