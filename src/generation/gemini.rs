//! Google Gemini `generateContent` invoker.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::{Content, GenerationRequest};
use super::traits::GenerationInvoker;
use crate::config::GeminiSettings;
use crate::{Error, Result};

pub const BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

pub struct GeminiInvoker {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiInvoker")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiInvoker {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key: String = api_key.into();
        Self::build(SecretString::from(api_key), BASE_URL.into(), DEFAULT_TIMEOUT)
    }

    /// Reads `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| Error::Config("GEMINI_API_KEY is not set".into()))?;
        Self::new(key)
    }

    pub fn from_settings(settings: &GeminiSettings) -> Result<Self> {
        let key = settings
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("gemini.api_key is not set".into()))?;
        Self::build(key, settings.base_url.clone(), settings.timeout())
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        Self::build(self.api_key, self.base_url, timeout)
    }

    fn build(api_key: SecretString, base_url: String, timeout: Duration) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config("Gemini API key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            http,
            api_key,
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    fn transform_request(request: &GenerationRequest) -> GenerateContentRequest {
        let parts = request
            .contents
            .iter()
            .map(|content| match content {
                Content::Text(text) => Part::Text { text: text.clone() },
                Content::Image(image) => Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.clone(),
                        data: image.data.clone(),
                    },
                },
            })
            .collect();

        GenerateContentRequest {
            system_instruction: request.system.as_ref().map(|text| SystemInstruction {
                parts: vec![Part::Text { text: text.clone() }],
            }),
            contents: vec![RequestContent {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: request.output_schema.clone(),
                temperature: request.temperature,
            },
        }
    }
}

#[async_trait]
impl GenerationInvoker for GeminiInvoker {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn invoke(&self, model: &str, request: &GenerationRequest) -> Result<Value> {
        let body = Self::transform_request(request);

        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.timeout)
                } else {
                    Error::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(model, status.as_u16(), &text, retry_after));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedOutput(format!("unreadable response body: {}", e)))?;
        extract_output(body)
    }
}

/// Maps a non-2xx Gemini response onto the crate taxonomy.
pub fn classify_failure(
    model: &str,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> Error {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);

    let provider_status = detail.as_ref().and_then(|d| d.status.as_deref());
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .unwrap_or_else(|| body.to_string());
    let lowered = message.to_lowercase();

    let rate_limited = status == 429
        || provider_status == Some(RESOURCE_EXHAUSTED)
        || lowered.contains("rate limit")
        || lowered.contains("resource has been exhausted");

    if rate_limited {
        let retry_after = retry_after.or_else(|| detail.as_ref().and_then(ErrorBody::retry_delay));
        tracing::debug!(model, status, "provider reported rate limit");
        return Error::RateLimited {
            model: model.to_string(),
            retry_after,
        };
    }

    Error::Api {
        message,
        status: Some(status),
        error_type: provider_status.map(str::to_string),
    }
}

fn extract_output(response: GenerateContentResponse) -> Result<Value> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(Error::MalformedOutput(format!("prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::MalformedOutput("response has no candidates".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Error::MalformedOutput(format!(
            "empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    serde_json::from_str(strip_code_fence(&text))
        .map_err(|e| Error::MalformedOutput(format!("output is not valid JSON: {}", e)))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

impl ErrorBody {
    /// `google.rpc.RetryInfo.retryDelay`, e.g. `"23s"`.
    fn retry_delay(&self) -> Option<Duration> {
        self.details
            .iter()
            .filter_map(|d| d.get("retryDelay").and_then(Value::as_str))
            .find_map(|delay| delay.strip_suffix('s')?.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }
}
