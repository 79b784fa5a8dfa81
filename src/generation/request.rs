//! Provider-neutral generation request.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Image payload sent inline with the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64, standard alphabet.
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let image = Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        };
        image.validate()?;
        Ok(image)
    }

    /// Parses `data:<mime>;base64,<payload>`.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| Error::InvalidRequest("image must be a data URI".into()))?;
        let (meta, data) = rest
            .split_once(',')
            .ok_or_else(|| Error::InvalidRequest("data URI has no payload".into()))?;
        let mime_type = meta.strip_suffix(";base64").ok_or_else(|| {
            Error::InvalidRequest("data URI must be base64 encoded".into())
        })?;

        STANDARD
            .decode(data)
            .map_err(|e| Error::InvalidRequest(format!("invalid base64 image data: {}", e)))?;

        let image = Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        };
        image.validate()?;
        Ok(image)
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime = mime_guess::from_path(path).first().ok_or_else(|| {
            Error::InvalidRequest(format!("unknown image type: {}", path.display()))
        })?;
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(mime.essence_str(), &bytes)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.mime_type.starts_with("image/") {
            return Err(Error::InvalidRequest(format!(
                "expected an image, got {}",
                self.mime_type
            )));
        }
        if self.data.is_empty() {
            return Err(Error::InvalidRequest("image data is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Image(InlineImage),
}

/// One structured generation: prompt parts plus the JSON schema the
/// answer must satisfy.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub flow: &'static str,
    pub system: Option<String>,
    pub contents: Vec<Content>,
    pub output_schema: Value,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(flow: &'static str, output_schema: Value) -> Self {
        Self {
            flow,
            system: None,
            contents: Vec::new(),
            output_schema,
            temperature: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.contents.push(Content::Text(text.into()));
        self
    }

    pub fn image(mut self, image: InlineImage) -> Self {
        self.contents.push(Content::Image(image));
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}
