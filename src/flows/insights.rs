//! Inspiration insights: what an image offers a writer before any poem
//! exists.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::push_option;
use crate::generation::{GenerationRequest, InlineImage, output_schema};
use crate::{ModelRouter, Result};

const FLOW: &str = "insights";

const SYSTEM_PROMPT: &str = "You help writers find material in images. Describe what the \
image offers a poet: its emotional register, the themes it suggests, and the specific sensory \
details worth writing about. Finish with a few short writing prompts that could start a poem.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InsightOutput {
    /// One or two sentences on what the image shows.
    pub summary: String,
    pub moods: Vec<String>,
    pub themes: Vec<String>,
    pub imagery: Vec<String>,
    /// Opening lines or questions to start writing from.
    pub prompts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InsightRequest {
    image: InlineImage,
    focus: Option<String>,
}

impl InsightRequest {
    pub fn new(image: InlineImage) -> Self {
        Self { image, focus: None }
    }

    /// Narrows the insights, e.g. "the figure in the doorway".
    pub fn focus(mut self, focus: impl Into<String>) -> Self {
        self.focus = Some(focus.into());
        self
    }

    pub fn to_generation_request(&self) -> Result<GenerationRequest> {
        self.image.validate()?;

        let mut prompt = String::from("What could a poet draw from this image?");
        push_option(&mut prompt, "Focus on", self.focus.as_deref());

        Ok(GenerationRequest::new(FLOW, output_schema::<InsightOutput>())
            .system(SYSTEM_PROMPT)
            .image(self.image.clone())
            .text(prompt)
            .temperature(0.7))
    }
}

/// Blank entries are dropped from every list.
pub async fn generate_insights(
    router: &ModelRouter,
    request: InsightRequest,
) -> Result<InsightOutput> {
    let mut output: InsightOutput = router.generate(&request.to_generation_request()?).await?;

    for list in [
        &mut output.moods,
        &mut output.themes,
        &mut output.imagery,
        &mut output.prompts,
    ] {
        list.retain(|item| !item.trim().is_empty());
    }
    Ok(output)
}
