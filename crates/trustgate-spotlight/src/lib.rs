//! # Trustgate Spotlight
//!
//! Delimiter-based prompt spotlighting: untrusted text is wrapped in
//! visible delimiters and the system prompt is prepended with explicit
//! "treat delimited content as data" guidance, so a downstream
//! instruction-following model respects the trust boundary.
//!
//! The same delimiters give two detection hooks: user input containing
//! the delimiters (or phrases about escaping them) is a boundary-escape
//! attempt, and model output echoing them indicates boundary confusion.

mod spotlighter;
mod style;
mod transform;

pub use spotlighter::{PromptSpotlighter, SpotlightStats};
pub use style::DelimiterStyle;
pub use transform::{EscapeDetection, ResponseValidation, SpotlightTransform, SpotlightedPrompt};
