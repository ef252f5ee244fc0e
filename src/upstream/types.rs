use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of a call to the generative service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The service is temporarily overloaded; worth retrying
    #[error("service overloaded (status {status}): {message}")]
    Overloaded {
        /// HTTP status, 503 when inferred from a message
        status: u16,
        /// Error text returned by the service
        message: String,
    },

    /// The service answered with a non-retryable HTTP error
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status
        status: u16,
        /// Error text returned by the service
        message: String,
    },

    /// No API key is configured
    #[error("missing API credential: {0}")]
    MissingCredential(String),

    /// Any other failure (transport, decoding, empty answer)
    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Returns true for failures the retry policy retries
    pub fn is_overloaded(&self) -> bool {
        matches!(self, UpstreamError::Overloaded { .. })
    }

    /// Classifies an HTTP error response
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 503 || status == 429 || mentions_overload(body) {
            UpstreamError::Overloaded {
                status,
                message: body.to_string(),
            }
        } else {
            UpstreamError::Http {
                status,
                message: body.to_string(),
            }
        }
    }

    /// Classifies an error known only by its message
    pub fn from_message(message: &str) -> Self {
        if message.contains("503") || mentions_overload(message) {
            UpstreamError::Overloaded {
                status: 503,
                message: message.to_string(),
            }
        } else {
            UpstreamError::Other(message.to_string())
        }
    }
}

fn mentions_overload(text: &str) -> bool {
    text.to_lowercase().contains("overloaded")
}

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions for the model
    System,
    /// Message from the user
    User,
    /// Message from the model
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Configuration for a generative-language client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the model to use
    pub model: String,

    /// Base URL for the API
    pub api_url: String,

    /// API key for authentication
    #[serde(skip_serializing)]
    pub api_key: String,

    /// HTTP timeout
    pub timeout: Duration,

    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (higher = more random)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A completion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Messages in the conversation
    pub messages: Vec<Message>,

    /// Maximum number of tokens to generate, overriding the client default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling, overriding the client default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// A single user prompt
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            ..Self::default()
        }
    }
}

/// A completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated content
    pub content: String,

    /// Model that generated the completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Total number of tokens used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// Trait for generative-language clients
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, UpstreamError>;

    /// Model name used by this client
    fn model(&self) -> &str;

    /// Sends a single user prompt and returns the generated text
    async fn ask(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.complete(CompletionRequest::from_prompt(prompt))
            .await
            .map(|completion| completion.content)
    }
}
