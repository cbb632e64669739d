use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use async_trait::async_trait;
use futures::Stream;
use openai_dive::v1::resources::chat::{ChatCompletionChunkResponse, ChatCompletionParameters, ChatCompletionResponse};
use openai_dive::v1::resources::model::ListModelResponse;

use crate::responses::ResponsesClient;

pub type LlmError = Box<dyn Error + Send + Sync>;

/// Chunks of a streamed chat completion
pub type LlmStream = Box<dyn Stream<Item = Result<ChatCompletionChunkResponse, LlmError>> + Send + Unpin>;

/// Environment variable a provider is configured from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

impl EnvVar {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self { name, description, required: true }
    }

    pub const fn optional(name: &'static str, description: &'static str) -> Self {
        Self { name, description, required: false }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub display_name: &'static str,
    pub env_vars: Vec<EnvVar>,
    /// the endpoint also serves `/responses`
    pub responses_api: bool,
}

impl ProviderInfo {
    /// Required variables absent from `values`
    pub fn missing(&self, values: &HashMap<String, String>) -> Vec<&'static str> {
        self.env_vars
            .iter()
            .filter(|var| var.required && !values.contains_key(var.name))
            .map(|var| var.name)
            .collect()
    }

    /// Snapshot of the provider variables currently set in the process environment
    pub fn read_process_env(&self) -> HashMap<String, String> {
        self.env_vars
            .iter()
            .filter_map(|var| std::env::var(var.name).ok().map(|value| (var.name.to_string(), value)))
            .collect()
    }
}

/// An endpoint speaking the Chat Completions dialect
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn models(&self) -> Result<ListModelResponse, LlmError>;

    /// First listed model unless the provider knows better
    async fn default_model(&self) -> Result<String, LlmError> {
        self.models()
            .await?
            .data
            .into_iter()
            .next()
            .map(|model| model.id)
            .ok_or_else(|| format!("{} lists no model", self.name()).into())
    }

    async fn chat(&self, request: ChatCompletionParameters) -> Result<ChatCompletionResponse, LlmError>;

    async fn chat_stream(&self, request: ChatCompletionParameters) -> Result<LlmStream, LlmError>;

    /// Responses API of the same endpoint, None when it only has chat completions
    fn responses(&self) -> Option<ResponsesClient> {
        None
    }

    fn name(&self) -> &'static str;

    fn info() -> ProviderInfo
    where
        Self: Sized;
}

impl fmt::Debug for dyn LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LlmProvider").field(&self.name()).finish()
    }
}
