//! Chain-of-trust shield around an untrusted downstream process.
//!
//! State machine per request:
//! `Start -> InputGuard -> {Blocked@Input | CoreLogic} -> OutputGuard ->
//! {Blocked@Output | AllClear}`. The input guard is the detection
//! orchestrator; the core logic is caller-supplied; the output guard is a
//! caller-supplied validator plus a delimiter-boundary check. A block at
//! the output stage means the input guard missed an attack, so the shield
//! persists the example for retraining.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use trustgate_layers::{CollaboratorError, DetectionRequest, FusionResult};
use trustgate_spotlight::{PromptSpotlighter, SpotlightStats, SpotlightTransform};

use crate::config::{ExecutionMode, TrustgateConfig};
use crate::error::ShieldError;
use crate::failure_log::{FailureExample, FailureLog};
use crate::orchestrator::DetectionOrchestrator;

/// The downstream process being guarded.
#[async_trait]
pub trait ProtectedLogic: Send + Sync {
    async fn invoke(&self, input: &str) -> Result<String, CollaboratorError>;
}

/// Verdict from the output validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputCheck {
    pub is_safe: bool,
    pub violation_type: String,
    pub confidence: f64,
    pub details: String,
}

/// Validates the downstream process's output against the original input.
#[async_trait]
pub trait OutputValidator: Send + Sync {
    async fn validate(
        &self,
        output: &str,
        original_input: &str,
    ) -> Result<OutputCheck, CollaboratorError>;
}

/// Stage at which a request's journey through the shield ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShieldStage {
    InputGuard,
    CoreLogic,
    OutputGuard,
    AllClear,
}

/// Final outcome of one shielded request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldOutcome {
    /// Terminal stage. [`ShieldStage::AllClear`] means the response passed
    /// every guard; anything else names where the request was stopped.
    pub stage: ShieldStage,
    /// The downstream response, present only when it may be shown.
    pub response: Option<String>,
    /// False when the response exists but its guards were degraded.
    pub is_trusted: bool,
    pub reasoning: String,
}

impl ShieldOutcome {
    fn blocked(stage: ShieldStage, reasoning: String) -> Self {
        Self {
            stage,
            response: None,
            is_trusted: false,
            reasoning,
        }
    }
}

/// Layered guard: input classification, spotlighted core logic, output
/// validation, failure capture.
pub struct ChainOfTrustShield {
    detector: Arc<DetectionOrchestrator>,
    logic: Arc<dyn ProtectedLogic>,
    validator: Arc<dyn OutputValidator>,
    spotlighter: PromptSpotlighter,
    failure_log: FailureLog,
    mode: ExecutionMode,
    call_timeout: Duration,
    safe_threshold: f64,
}

impl ChainOfTrustShield {
    pub fn new(
        config: &TrustgateConfig,
        detector: Arc<DetectionOrchestrator>,
        logic: Arc<dyn ProtectedLogic>,
        validator: Arc<dyn OutputValidator>,
    ) -> Result<Self, ShieldError> {
        if config.global.call_timeout_ms == 0 {
            return Err(ShieldError::Config(
                "call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        let failure_log = FailureLog::open(&config.global.failure_log_path)?;
        let transform = SpotlightTransform::new(
            config.spotlight.style,
            config.spotlight.add_instructions,
            config.spotlight.strict_mode,
        );
        Ok(Self {
            detector,
            logic,
            validator,
            spotlighter: PromptSpotlighter::new(transform),
            failure_log,
            mode: config.execution_mode,
            call_timeout: Duration::from_millis(config.global.call_timeout_ms),
            safe_threshold: config.router.safe,
        })
    }

    /// Run one request through the full chain of trust.
    pub async fn process(&self, request: DetectionRequest) -> ShieldOutcome {
        match self.mode {
            ExecutionMode::Sequential => self.process_sequential(request).await,
            ExecutionMode::Speculative => self.process_speculative(request).await,
        }
    }

    /// Hand accumulated input-guard misses to a retraining pass.
    pub fn drain_failures(&self) -> Vec<FailureExample> {
        self.failure_log.drain_failures()
    }

    pub fn pending_failures(&self) -> usize {
        self.failure_log.pending_len()
    }

    pub fn spotlight_stats(&self) -> SpotlightStats {
        self.spotlighter.stats()
    }

    async fn process_sequential(&self, request: DetectionRequest) -> ShieldOutcome {
        let verdict = self.detector.classify(&request).await;
        if verdict.is_threat {
            return self.blocked_at_input(&verdict);
        }

        let response = match self.run_core_logic(&request.text).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };
        self.run_output_guard(&request.text, response, &verdict)
            .await
    }

    async fn process_speculative(&self, request: DetectionRequest) -> ShieldOutcome {
        // Protected logic starts immediately; its latency hides behind the
        // input guard when the input turns out to be safe.
        let logic = Arc::clone(&self.logic);
        let wrapped = self.spotlighter.wrap("", &request.text);
        if !wrapped.escape.is_safe {
            return self.blocked_for_escape(&wrapped.escape.attempts);
        }
        let timeout = self.call_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::timeout(timeout, logic.invoke(&wrapped.user_input)).await
        });

        let verdict = self.detector.classify(&request).await;
        if verdict.is_threat {
            handle.abort();
            return self.blocked_at_input(&verdict);
        }

        let response = match handle.await {
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(err))) => return self.core_logic_failure(format!("{err}")),
            Ok(Err(_)) => return self.core_logic_failure("call timed out".to_string()),
            Err(err) => return self.core_logic_failure(format!("task failed: {err}")),
        };
        self.run_output_guard(&request.text, response, &verdict)
            .await
    }

    fn blocked_at_input(&self, verdict: &FusionResult) -> ShieldOutcome {
        info!(
            threat_type = %verdict.threat_type,
            confidence = verdict.confidence,
            "request blocked at input guard"
        );
        ShieldOutcome::blocked(
            ShieldStage::InputGuard,
            format!(
                "input blocked as {} (confidence {:.2}): {}",
                verdict.threat_type, verdict.confidence, verdict.reasoning
            ),
        )
    }

    async fn run_core_logic(&self, input: &str) -> Result<String, ShieldOutcome> {
        let wrapped = self.spotlighter.wrap("", input);
        if !wrapped.escape.is_safe {
            return Err(self.blocked_for_escape(&wrapped.escape.attempts));
        }
        match tokio::time::timeout(self.call_timeout, self.logic.invoke(&wrapped.user_input)).await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(self.core_logic_failure(format!("{err}"))),
            Err(_) => Err(self.core_logic_failure("call timed out".to_string())),
        }
    }

    /// Input carrying the spotlight delimiters (or escape phrasing) never
    /// reaches the protected logic, even when the classifier passed it.
    fn blocked_for_escape(&self, attempts: &[String]) -> ShieldOutcome {
        warn!(
            attempts = attempts.len(),
            "boundary escape in input, blocking before core logic"
        );
        ShieldOutcome::blocked(
            ShieldStage::InputGuard,
            format!("input blocked, boundary escape detected: {}", attempts.join("; ")),
        )
    }

    fn core_logic_failure(&self, cause: String) -> ShieldOutcome {
        warn!(%cause, "protected logic failed");
        ShieldOutcome {
            stage: ShieldStage::CoreLogic,
            response: Some("The request could not be completed at this time.".to_string()),
            is_trusted: false,
            reasoning: format!("protected logic failed: {cause}"),
        }
    }

    /// Output guard: boundary check, then the external validator. Skipped
    /// entirely when the input guard was confidently safe.
    async fn run_output_guard(
        &self,
        input: &str,
        response: String,
        verdict: &FusionResult,
    ) -> ShieldOutcome {
        if self.skip_output_guard(verdict) {
            return ShieldOutcome {
                stage: ShieldStage::AllClear,
                response: Some(response),
                is_trusted: true,
                reasoning: format!(
                    "output guard skipped, input confidently safe: {}",
                    verdict.reasoning
                ),
            };
        }

        let boundary = self.spotlighter.validate_response(&response);
        if !boundary.is_valid {
            let details = boundary.issues.join("; ");
            return self.blocked_at_output(input, verdict, &response, "boundary_violation", details);
        }

        let check =
            match tokio::time::timeout(self.call_timeout, self.validator.validate(&response, input))
                .await
            {
                Ok(Ok(check)) => check,
                Ok(Err(err)) => {
                    // Fail open: a down validator must not turn into an
                    // outage for every safe-looking request.
                    warn!(error = %err, "output validator unavailable, failing open");
                    return ShieldOutcome {
                        stage: ShieldStage::AllClear,
                        response: Some(response),
                        is_trusted: false,
                        reasoning: format!("output validator unavailable ({err}), failed open"),
                    };
                }
                Err(_) => {
                    warn!("output validator timed out, failing open");
                    return ShieldOutcome {
                        stage: ShieldStage::AllClear,
                        response: Some(response),
                        is_trusted: false,
                        reasoning: "output validator timed out, failed open".to_string(),
                    };
                }
            };

        if !check.is_safe {
            return self.blocked_at_output(
                input,
                verdict,
                &response,
                &check.violation_type,
                check.details,
            );
        }

        ShieldOutcome {
            stage: ShieldStage::AllClear,
            response: Some(response),
            is_trusted: true,
            reasoning: "all guards passed".to_string(),
        }
    }

    fn blocked_at_output(
        &self,
        input: &str,
        verdict: &FusionResult,
        response: &str,
        violation_type: &str,
        details: String,
    ) -> ShieldOutcome {
        // The input guard let this through; record it so the next guard
        // iteration learns from the miss.
        let example = FailureExample::new(
            input,
            if verdict.threat_type == "none" {
                violation_type.to_string()
            } else {
                verdict.threat_type.clone()
            },
            response,
            violation_type,
            details.clone(),
        );
        if let Err(err) = self.failure_log.append(example) {
            warn!(error = %err, "failed to persist failure example");
        }
        ShieldOutcome::blocked(ShieldStage::OutputGuard, details)
    }

    fn skip_output_guard(&self, verdict: &FusionResult) -> bool {
        verdict.detection_method == "fast_path_safe"
            || (!verdict.is_threat && verdict.confidence <= self.safe_threshold)
    }
}
