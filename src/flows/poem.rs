//! Poem from image.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::push_option;
use crate::generation::{GenerationRequest, InlineImage, output_schema};
use crate::{Error, ModelRouter, Result};

const FLOW: &str = "poem";

const SYSTEM_PROMPT: &str = "You are a poet. Look closely at the image you are given and write \
an original poem inspired by it. Ground the poem in concrete details from the image: light, \
color, texture, motion, and the feeling they evoke. Give the poem a short title. Put each line \
of the poem on its own line and separate stanzas with a blank line.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PoemAnalysis {
    /// Dominant emotional tone, in a few words.
    pub mood: String,
    pub themes: Vec<String>,
    /// Concrete images from the picture the poem draws on.
    pub imagery: Vec<String>,
    /// Poetic form actually used, e.g. "free verse" or "haiku".
    pub form: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PoemOutput {
    pub title: String,
    /// Newline-separated lines; blank lines separate stanzas.
    pub poem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<PoemAnalysis>,
}

impl PoemOutput {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.poem.lines()
    }

    /// Replaces line `index` (0-based, counting blank lines) in place.
    pub fn apply_rewrite(&mut self, index: usize, line: &str) -> Result<()> {
        self.poem = super::replace_line(&self.poem, index, line)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PoemRequest {
    image: InlineImage,
    form: Option<String>,
    tone: Option<String>,
    language: Option<String>,
    instructions: Option<String>,
    analysis: bool,
}

impl PoemRequest {
    pub fn new(image: InlineImage) -> Self {
        Self {
            image,
            form: None,
            tone: None,
            language: None,
            instructions: None,
            analysis: true,
        }
    }

    /// Requested form, e.g. "sonnet", "haiku", "free verse".
    pub fn form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }

    pub fn tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Whether to ask for [`PoemAnalysis`]. On by default.
    pub fn with_analysis(mut self, analysis: bool) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn to_generation_request(&self) -> Result<GenerationRequest> {
        self.image.validate()?;

        let mut prompt = String::from("Write a poem inspired by this image.");
        push_option(&mut prompt, "Form", self.form.as_deref());
        push_option(&mut prompt, "Tone", self.tone.as_deref());
        push_option(&mut prompt, "Language", self.language.as_deref());
        push_option(&mut prompt, "Additional instructions", self.instructions.as_deref());
        if self.analysis {
            prompt.push_str("\nAlso fill in `analysis` describing the poem you wrote.");
        } else {
            prompt.push_str("\nLeave `analysis` out.");
        }

        Ok(GenerationRequest::new(FLOW, output_schema::<PoemOutput>())
            .system(SYSTEM_PROMPT)
            .image(self.image.clone())
            .text(prompt)
            .temperature(0.9))
    }
}

pub async fn generate_poem(router: &ModelRouter, request: PoemRequest) -> Result<PoemOutput> {
    let generation = request.to_generation_request()?;
    let mut output: PoemOutput = router.generate(&generation).await?;

    if output.poem.trim().is_empty() {
        return Err(Error::MalformedOutput("model returned an empty poem".into()));
    }
    output.title = output.title.trim().to_string();
    if !request.analysis {
        output.analysis = None;
    }
    Ok(output)
}
