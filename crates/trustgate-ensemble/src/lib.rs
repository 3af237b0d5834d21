//! # Trustgate Ensemble
//!
//! Decision-making over layer results: the [`ConfidenceRouter`] decides
//! which layers are worth running next, and the
//! [`EnsembleDisagreementAnalyzer`] fuses the results that did run into a
//! final verdict, treating disagreement between layers as a risk signal of
//! its own.

mod analyzer;
mod router;

pub use analyzer::{AnalyzerStats, EnsembleConfig, EnsembleDisagreementAnalyzer};
pub use router::{ConfidenceLevel, ConfidenceRouter, RouterConfig, RouterStats, RoutingDecision};
