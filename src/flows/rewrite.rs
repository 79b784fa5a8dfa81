//! Alternative phrasings for one line of an existing poem.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::push_option;
use crate::generation::{GenerationRequest, output_schema};
use crate::{Error, ModelRouter, Result};

const FLOW: &str = "rewrite";

pub const DEFAULT_SUGGESTIONS: usize = 3;
pub const MAX_SUGGESTIONS: usize = 5;

const SYSTEM_PROMPT: &str = "You are a careful poetry editor. You will be given a poem and one \
line from it. Suggest replacement lines that fit the poem's voice, meter, and imagery. Each \
suggestion must be a single line with no numbering or quotation marks.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RewriteOutput {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RewriteRequest {
    poem: String,
    line: usize,
    instruction: Option<String>,
    count: usize,
}

impl RewriteRequest {
    /// `line` is a 0-based index into `poem.lines()`.
    pub fn new(poem: impl Into<String>, line: usize) -> Self {
        Self {
            poem: poem.into(),
            line,
            instruction: None,
            count: DEFAULT_SUGGESTIONS,
        }
    }

    /// e.g. "make it darker", "fewer syllables".
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn target_line(&self) -> Result<&str> {
        let line = self.poem.lines().nth(self.line).ok_or_else(|| {
            Error::InvalidRequest(format!(
                "line {} is out of range for a {}-line poem",
                self.line,
                self.poem.lines().count()
            ))
        })?;
        if line.trim().is_empty() {
            return Err(Error::InvalidRequest(format!("line {} is blank", self.line)));
        }
        Ok(line)
    }

    pub fn to_generation_request(&self) -> Result<GenerationRequest> {
        if !(1..=MAX_SUGGESTIONS).contains(&self.count) {
            return Err(Error::InvalidRequest(format!(
                "suggestion count must be between 1 and {}, got {}",
                MAX_SUGGESTIONS, self.count
            )));
        }
        let target = self.target_line()?;

        let mut prompt = format!(
            "Poem:\n{}\n\nLine {} to rewrite:\n{}\n\nGive exactly {} suggestions.",
            self.poem,
            self.line + 1,
            target.trim(),
            self.count
        );
        push_option(&mut prompt, "Direction", self.instruction.as_deref());

        Ok(GenerationRequest::new(FLOW, output_schema::<RewriteOutput>())
            .system(SYSTEM_PROMPT)
            .text(prompt)
            .temperature(1.0))
    }
}

/// Returns at most the requested number of distinct, non-blank
/// suggestions. Suggestions identical to the original line are dropped.
pub async fn suggest_rewrites(
    router: &ModelRouter,
    request: RewriteRequest,
) -> Result<RewriteOutput> {
    let generation = request.to_generation_request()?;
    let original = request.target_line()?.trim().to_string();

    let output: RewriteOutput = router.generate(&generation).await?;

    let mut suggestions: Vec<String> = Vec::with_capacity(request.count);
    for suggestion in output.suggestions {
        let suggestion = suggestion.trim();
        if suggestion.is_empty()
            || suggestion == original
            || suggestions.iter().any(|s| s == suggestion)
        {
            continue;
        }
        suggestions.push(suggestion.to_string());
        if suggestions.len() == request.count {
            break;
        }
    }

    tracing::debug!(
        requested = request.count,
        returned = suggestions.len(),
        "rewrite suggestions ready"
    );
    Ok(RewriteOutput { suggestions })
}

/// Returns `poem` with line `index` replaced by `line`. Other lines,
/// including blank stanza breaks, are kept as they are.
pub fn replace_line(poem: &str, index: usize, line: &str) -> Result<String> {
    if line.contains('\n') {
        return Err(Error::InvalidRequest(
            "replacement must be a single line".into(),
        ));
    }

    let mut lines: Vec<&str> = poem.lines().collect();
    let slot = lines.get_mut(index).ok_or_else(|| {
        Error::InvalidRequest(format!("line {} is out of range", index))
    })?;
    *slot = line;

    let mut result = lines.join("\n");
    if poem.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}
