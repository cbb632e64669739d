use async_trait::async_trait;
use openai_dive::v1::resources::chat::{ChatCompletionParameters, ChatCompletionResponse};
use openai_dive::v1::resources::model::ListModelResponse;

use super::ChatEndpoint;
use crate::provider::{EnvVar, LlmError, LlmProvider, LlmStream, ProviderInfo};

const API_KEY: &str = "OPENAI_COMPATIBLE_API_KEY";
const BASE_URL: &str = "OPENAI_COMPATIBLE_BASE_URL";

/// Any endpoint speaking the Chat Completions dialect (vLLM, llama.cpp, LiteLLM...).
/// Only usable with the chat backend.
pub struct OpenAICompatibleProvider {
    chat: ChatEndpoint,
}

impl OpenAICompatibleProvider {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self { chat: ChatEndpoint::new(&api_key, &base_url) }
    }

    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(API_KEY).ok()?;
        let base_url = std::env::var(BASE_URL).ok()?;
        Some(Self::new(api_key, base_url))
    }
}

#[async_trait]
impl LlmProvider for OpenAICompatibleProvider {
    async fn models(&self) -> Result<ListModelResponse, LlmError> {
        self.chat.models().await
    }

    async fn chat(&self, request: ChatCompletionParameters) -> Result<ChatCompletionResponse, LlmError> {
        self.chat.chat(request).await
    }

    async fn chat_stream(&self, request: ChatCompletionParameters) -> Result<LlmStream, LlmError> {
        self.chat.chat_stream(request).await
    }

    fn name(&self) -> &'static str {
        "openai_compatible"
    }

    fn info() -> ProviderInfo {
        ProviderInfo {
            name: "openai_compatible",
            display_name: "OpenAI compatible Chat Completions endpoint",
            env_vars: vec![
                EnvVar::required(API_KEY, "API key of the endpoint"),
                EnvVar::required(BASE_URL, "Base URL of the endpoint, e.g. http://localhost:8000/v1"),
            ],
            responses_api: false,
        }
    }
}
