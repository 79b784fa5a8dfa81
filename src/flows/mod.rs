//! Generation use-cases served by the router.
//!
//! Each flow validates its input, builds a [`GenerationRequest`] whose
//! output schema is derived from the flow's result type, and runs it
//! through [`ModelRouter::generate`](crate::ModelRouter::generate).
//!
//! [`GenerationRequest`]: crate::GenerationRequest

pub mod insights;
pub mod poem;
pub mod rewrite;

pub use insights::{InsightOutput, InsightRequest, generate_insights};
pub use poem::{PoemAnalysis, PoemOutput, PoemRequest, generate_poem};
pub use rewrite::{RewriteOutput, RewriteRequest, replace_line, suggest_rewrites};

/// Appends `label: value` to a prompt when `value` is set and non-blank.
fn push_option(prompt: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        prompt.push_str(&format!("\n{}: {}", label, value));
    }
}
