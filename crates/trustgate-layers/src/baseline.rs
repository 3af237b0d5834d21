//! Regex pattern baseline and the layer wrapping it.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::collaborators::{BaselineReport, PatternBaseline};
use crate::layer::{Detection, DetectionLayer, LayerKind};
use crate::model::{DetectionRequest, LayerResult};

/// A named category of threat patterns.
struct CategoryPatterns {
    category: &'static str,
    patterns: Vec<Regex>,
    /// High-severity categories score 3; the rest score 1.
    high_severity: bool,
}

/// Fast categorized regex matching over raw input text.
///
/// This is the only collaborator that ships in-crate: it is cheap enough
/// (1-2ms) to run on every request and anchors the confidence router.
pub struct RegexBaseline {
    categories: Vec<CategoryPatterns>,
}

impl RegexBaseline {
    pub fn new() -> Self {
        Self {
            categories: Self::build_categories(),
        }
    }

    fn build_categories() -> Vec<CategoryPatterns> {
        vec![
            CategoryPatterns {
                category: "prompt_injection",
                high_severity: false,
                patterns: vec![
                    Regex::new(r"(?i)ignore\s+(?:previous|all|your)\s+(?:instructions?|prompts?|rules?)").unwrap(),
                    Regex::new(r"(?i)disregard\s+(?:previous|all|system)\s+(?:instructions?|constraints?)").unwrap(),
                    Regex::new(r"(?i)forget\s+(?:everything|all|your)\s+(?:above|previous|instructions?)").unwrap(),
                    Regex::new(r"(?i)new\s+(?:instructions?|task|role|persona)").unwrap(),
                    Regex::new(r"(?i)you\s+are\s+now\s+(?:a|an|the)\s+\w+").unwrap(),
                    Regex::new(r"(?i)act\s+as\s+(?:if|a|an)\s+\w+").unwrap(),
                    Regex::new(r"(?i)switch\s+to\s+\w+\s+mode").unwrap(),
                    Regex::new(r"</?(?:system|instruction|prompt|rules?)>").unwrap(),
                    Regex::new(r"(?i)(?:print|reveal)\s+(?:the|your)\s+(?:prompt|instructions?)").unwrap(),
                ],
            },
            CategoryPatterns {
                category: "system_prompt_attack",
                high_severity: true,
                patterns: vec![
                    Regex::new(r"(?i)system\s+prompt").unwrap(),
                    Regex::new(r"(?i)override\s+(?:system|the\s+system)").unwrap(),
                    Regex::new(r"(?i)(?:reveal|modify|change|access)\s+(?:system\s+prompt|the\s+prompt)").unwrap(),
                ],
            },
            CategoryPatterns {
                category: "auth_bypass",
                high_severity: true,
                patterns: vec![
                    Regex::new(r"(?i)(?:admin|root|administrator|superuser)[\s:]+(?:access|login|auth)").unwrap(),
                    Regex::new(r"(?i)bypass\s+(?:authentication|authorization|login|security)").unwrap(),
                    Regex::new(r"(?i)(?:skip|ignore)\s+(?:auth|login|verification)").unwrap(),
                    Regex::new(r"(?i)backdoor|master\s+password").unwrap(),
                    Regex::new(r"(?i)privilege\s+escalation").unwrap(),
                ],
            },
            CategoryPatterns {
                category: "data_exfiltration",
                high_severity: true,
                patterns: vec![
                    Regex::new(r"(?i)(?:show|display|print|return|give)\s+(?:me\s+)?(?:all\s+)?(?:the\s+)?(?:user|customer|client)\s+(?:data|info|details)").unwrap(),
                    Regex::new(r"(?i)database\s+(?:dump|export|backup|content)").unwrap(),
                    Regex::new(r"(?i)list\s+(?:all\s+)?(?:users?|customers?|accounts?|emails?)").unwrap(),
                    Regex::new(r"(?i)\b(?:api[_\s]?key|secret[_\s]?key|access[_\s]?token)[\s:]\s*[a-zA-Z0-9]{20,}").unwrap(),
                ],
            },
            CategoryPatterns {
                category: "code_injection",
                high_severity: true,
                patterns: vec![
                    Regex::new(r"(?i)(?:inject|execute|run)\s+(?:code|script|command)").unwrap(),
                    Regex::new(r"(?i)(?:sql\s+injection|xss|csrf)").unwrap(),
                    Regex::new(r"(?i)(?:<script|eval\s*\(|os\.system\s*\()").unwrap(),
                    Regex::new(r"(?i)(?:DROP\s+TABLE|DELETE\s+TABLE|UNION\s+SELECT)").unwrap(),
                ],
            },
            CategoryPatterns {
                category: "jailbreak",
                high_severity: false,
                patterns: vec![
                    Regex::new(r"(?i)jailbreak|break\s+out|escape\s+jail").unwrap(),
                    Regex::new(r"(?i)unrestricted\s+mode|free\s+mode").unwrap(),
                    Regex::new(r"(?i)developer\s+mode|admin\s+mode").unwrap(),
                    Regex::new(r"(?i)bypass\s+(?:restrictions|filters|rules)").unwrap(),
                ],
            },
        ]
    }
}

impl Default for RegexBaseline {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternBaseline for RegexBaseline {
    fn check(&self, text: &str) -> BaselineReport {
        let mut categories = Vec::new();
        let mut severity: u8 = 0;

        for group in &self.categories {
            if group.patterns.iter().any(|p| p.is_match(text)) {
                categories.push(group.category.to_string());
                severity = severity.max(if group.high_severity { 3 } else { 1 });
            }
        }

        if !categories.is_empty() {
            debug!(?categories, severity, "baseline patterns matched");
        }
        BaselineReport {
            categories,
            severity,
        }
    }
}

/// Always-on first layer wrapping a [`PatternBaseline`].
///
/// Severity maps to threat confidence: 3+ scores 0.95, 1-2 scales into
/// 0.5-0.95 (`0.5 + severity * 0.225`), 0 scores a confident-safe 0.05.
pub struct PatternBaselineLayer {
    baseline: Arc<dyn PatternBaseline>,
}

impl PatternBaselineLayer {
    pub fn new(baseline: Arc<dyn PatternBaseline>) -> Self {
        Self { baseline }
    }
}

impl Default for PatternBaselineLayer {
    fn default() -> Self {
        Self::new(Arc::new(RegexBaseline::new()))
    }
}

#[async_trait]
impl DetectionLayer for PatternBaselineLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::PatternBaseline
    }

    async fn evaluate(&self, request: &DetectionRequest) -> Detection {
        let report = self.baseline.check(&request.text);

        let result = if report.severity >= 3 {
            LayerResult::new(
                self.kind().as_str(),
                true,
                0.95,
                "regex_baseline",
                format!("high-severity patterns matched: {}", report.categories.join(", ")),
            )
        } else if report.severity >= 1 {
            LayerResult::new(
                self.kind().as_str(),
                true,
                0.5 + f64::from(report.severity) * 0.225,
                "regex_baseline",
                format!("patterns matched: {}", report.categories.join(", ")),
            )
        } else {
            LayerResult::new(
                self.kind().as_str(),
                false,
                0.05,
                "regex_baseline",
                "no baseline patterns matched",
            )
        };

        let result = result
            .with_metadata("severity", report.severity.to_string())
            .with_metadata("threats", report.categories.join(","));
        Detection::Result(result)
    }
}
