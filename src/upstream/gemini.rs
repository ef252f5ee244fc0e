use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::Settings;
use crate::telemetry::add_metric;
use crate::utils::error::{McpError, McpResult};

use super::types::{
    Completion, CompletionRequest, LlmClient, LlmConfig, Message, MessageRole, UpstreamError,
};

/// Client for the Gemini `generateContent` API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: LlmConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u32>,
}

impl GeminiClient {
    /// Creates a client; fails only if the HTTP client cannot be built
    pub fn new(config: LlmConfig) -> McpResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| McpError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Creates a client from settings, reading the API key from the environment
    pub fn from_settings(settings: &Settings) -> McpResult<Self> {
        let upstream = &settings.upstream;
        Self::new(LlmConfig {
            model: upstream.model.clone(),
            api_url: upstream.api_url.trim_end_matches('/').to_string(),
            api_key: settings.require_api_key()?,
            timeout: std::time::Duration::from_secs(upstream.timeout_seconds),
            max_tokens: None,
            temperature: None,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_url, self.config.model
        )
    }

    fn build_request(&self, request: &CompletionRequest) -> GenerateRequest {
        let system: Vec<Part> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| Part {
                text: m.content.clone(),
            })
            .collect();

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(to_content)
            .collect();

        let max_tokens = request.max_tokens.or(self.config.max_tokens);
        let temperature = request.temperature.or(self.config.temperature);
        let generation_config = (max_tokens.is_some() || temperature.is_some()).then(|| {
            GenerationConfig {
                max_output_tokens: max_tokens,
                temperature,
            }
        });

        GenerateRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: system,
            }),
            generation_config,
        }
    }
}

fn to_content(message: &Message) -> Content {
    let role = match message.role {
        MessageRole::Assistant => "model",
        _ => "user",
    };
    Content {
        role: Some(role.to_string()),
        parts: vec![Part {
            text: message.content.clone(),
        }],
    }
}

fn extract_text(response: &GenerateResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    #[instrument(skip(self, request), fields(model = %self.config.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, UpstreamError> {
        if self.config.api_key.is_empty() {
            return Err(UpstreamError::MissingCredential(
                "no API key configured".to_string(),
            ));
        }

        let start = std::time::Instant::now();
        let url = self.endpoint();
        debug!("Sending request to Gemini API: {}", url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&self.build_request(&request))
            .send()
            .await
            .map_err(|e| UpstreamError::from_message(&e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Gemini API error ({}): {}", status, body);
            return Err(UpstreamError::from_status(status.as_u16(), &body));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Other(format!("undecodable response: {}", e)))?;

        add_metric(
            "llm_request_duration_ms",
            start.elapsed().as_millis() as f64,
            &[
                ("model", self.config.model.clone()),
                ("provider", "gemini".to_string()),
            ],
        );

        let content = extract_text(&body)
            .ok_or_else(|| UpstreamError::Other("response contained no text".to_string()))?;

        Ok(Completion {
            content,
            model: body.model_version.or_else(|| Some(self.config.model.clone())),
            total_tokens: body.usage_metadata.and_then(|u| u.total_token_count),
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
