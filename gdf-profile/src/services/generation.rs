//! Generation Service client
//!
//! Text and image generation through a Gemini-compatible
//! `generateContent` endpoint. Image parts arrive base64-encoded inline and
//! are decoded here.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::GenerationError;

const USER_AGENT: &str = concat!("gdf-profile/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Per-call model selection
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: Option<f32>,
    /// e.g. `application/json` to request structured output
    pub response_mime_type: Option<String>,
}

impl ModelConfig {
    pub fn text(model: &str) -> Self {
        Self {
            model: model.to_string(),
            temperature: None,
            response_mime_type: None,
        }
    }

    pub fn json(model: &str) -> Self {
        Self {
            response_mime_type: Some("application/json".to_string()),
            ..Self::text(model)
        }
    }
}

/// Generated content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutput {
    Text(String),
    Image { mime_type: String, bytes: Vec<u8> },
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        model: &ModelConfig,
    ) -> Result<GenerationOutput, GenerationError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<RequestGenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str, model: &'a ModelConfig) -> Self {
        let generation_config = if model.temperature.is_some() || model.response_mime_type.is_some() {
            Some(RequestGenerationConfig {
                temperature: model.temperature,
                response_mime_type: model.response_mime_type.as_deref(),
            })
        } else {
            None
        };

        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config,
        }
    }
}

/// Pick the first usable part; inline images win over text
fn extract_output(response: GenerateResponse) -> Result<GenerationOutput, GenerationError> {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let mut text = String::new();
    for part in parts {
        if let Some(inline) = part.inline_data {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(inline.data.as_bytes())
                .map_err(|e| GenerationError::Malformed(format!("invalid inline data: {}", e)))?;
            return Ok(GenerationOutput::Image {
                mime_type: inline.mime_type,
                bytes,
            });
        }
        if let Some(t) = part.text {
            text.push_str(&t);
        }
    }

    if text.is_empty() {
        return Err(GenerationError::Malformed("response has no content".to_string()));
    }
    Ok(GenerationOutput::Text(text))
}

/// Gemini-compatible client
pub struct GeminiClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str, api_key: String) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.endpoint, model)
    }
}

#[async_trait]
impl GenerationService for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        model: &ModelConfig,
    ) -> Result<GenerationOutput, GenerationError> {
        tracing::debug!(model = %model.model, prompt_len = prompt.len(), "Calling generation service");

        let response = self
            .http_client
            .post(self.url(&model.model))
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&GenerateRequest::new(prompt, model))
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        extract_output(body)
    }
}
