//! Stateful spotlighting front end with counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::transform::{ResponseValidation, SpotlightTransform, SpotlightedPrompt};

/// Snapshot of spotlighting counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotlightStats {
    pub transforms: u64,
    pub escape_attempts: u64,
    pub boundary_violations: u64,
}

/// [`SpotlightTransform`] plus aggregate counters for observability.
pub struct PromptSpotlighter {
    transform: SpotlightTransform,
    transforms: AtomicU64,
    escape_attempts: AtomicU64,
    boundary_violations: AtomicU64,
}

impl PromptSpotlighter {
    pub fn new(transform: SpotlightTransform) -> Self {
        Self {
            transform,
            transforms: AtomicU64::new(0),
            escape_attempts: AtomicU64::new(0),
            boundary_violations: AtomicU64::new(0),
        }
    }

    pub fn wrap(&self, system_prompt: &str, user_input: &str) -> SpotlightedPrompt {
        self.transforms.fetch_add(1, Ordering::Relaxed);
        let wrapped = self.transform.wrap(system_prompt, user_input);
        if !wrapped.escape.is_safe {
            self.escape_attempts.fetch_add(1, Ordering::Relaxed);
        }
        wrapped
    }

    pub fn validate_response(&self, response: &str) -> ResponseValidation {
        let validation = self.transform.validate_response(response);
        if !validation.is_valid {
            self.boundary_violations.fetch_add(1, Ordering::Relaxed);
        }
        validation
    }

    pub fn stats(&self) -> SpotlightStats {
        SpotlightStats {
            transforms: self.transforms.load(Ordering::Relaxed),
            escape_attempts: self.escape_attempts.load(Ordering::Relaxed),
            boundary_violations: self.boundary_violations.load(Ordering::Relaxed),
        }
    }
}

impl Default for PromptSpotlighter {
    fn default() -> Self {
        Self::new(SpotlightTransform::default())
    }
}
