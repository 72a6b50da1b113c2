//! Prompts sent to the vision model alongside each page image.
//!
//! Callers can override the default via
//! [`crate::config::ReportConfig::prompt`]; the constant here is used only
//! when no override is provided.

/// Default per-page analysis prompt.
///
/// Kept short on purpose: small local vision models (qwen2.5vl:3b, llava)
/// follow a single focused instruction far better than a rule list.
pub const DEFAULT_ANALYSIS_PROMPT: &str =
    "Extract all technical clearances, dimensions, and reference frames as concise bullet points.";
