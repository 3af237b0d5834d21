//! Error types for shield construction.
//!
//! Nothing in the request path is fatal: layer failures fail open, cache
//! failures degrade, and `classify` is infallible. The only errors that
//! surface to callers are construction-time misconfiguration.

use thiserror::Error;

/// Failure to construct a shield or orchestrator.
#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failure log unavailable: {0}")]
    Io(#[from] std::io::Error),
}
