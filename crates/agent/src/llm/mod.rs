//! Model provider seam.
//!
//! The agent only talks to a model through [`ModelClient`]; the concrete
//! Gemini client lives in [`gemini`]. Failures are classified into
//! [`ProviderError`] so the caller can tell a quota or transient outage from
//! a request that will never succeed.

pub mod gemini;

use async_trait::async_trait;
use querent_core::domain::message::{Message, ToolCall};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use gemini::{GeminiClient, GeminiClientFactory, GeminiSettings};

/// Function declaration advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Everything the model sees for one invocation.
#[derive(Clone, Copy, Debug)]
pub struct ModelRequest<'a> {
    pub system_instruction: &'a str,
    pub tools: &'a [ToolSpec],
    pub messages: &'a [Message],
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    Answer(String),
    ToolCalls(Vec<ToolCall>),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("provider request failed: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Classifies an unsuccessful HTTP status returned by the provider.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = format!("status {status}: {}", detail.into());
        match status {
            429 => Self::QuotaExhausted(detail),
            500 | 502 | 503 | 504 => Self::Transient(detail),
            _ => Self::Rejected(detail),
        }
    }

    /// Quota and transient failures are worth retrying with another credential.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_) | Self::Transient(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(status.as_u16(), error.to_string());
        }
        if error.is_timeout() || error.is_connect() {
            Self::Transient(error.to_string())
        } else {
            Self::Rejected(error.to_string())
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelReply, ProviderError>;
}
