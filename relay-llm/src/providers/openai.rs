use async_trait::async_trait;
use openai_dive::v1::resources::chat::{ChatCompletionParameters, ChatCompletionResponse};
use openai_dive::v1::resources::model::ListModelResponse;

use super::ChatEndpoint;
use crate::provider::{EnvVar, LlmError, LlmProvider, LlmStream, ProviderInfo};
use crate::responses::{ResponsesClient, DEFAULT_BASE_URL};

const PREFERRED_MODEL: &str = "gpt-4.1";

/// api.openai.com, or a proxy of it, with both the chat and the responses dialects
pub struct OpenAIProvider {
    chat: ChatEndpoint,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            chat: ChatEndpoint::new(&api_key, &base_url),
            api_key,
            base_url,
        }
    }

    /// OPENAI_API_KEY, and OPENAI_BASE_URL when set
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        Some(match std::env::var("OPENAI_BASE_URL") {
            Ok(base_url) => Self::with_base_url(api_key, base_url),
            Err(_) => Self::new(api_key),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn models(&self) -> Result<ListModelResponse, LlmError> {
        self.chat.models().await
    }

    async fn default_model(&self) -> Result<String, LlmError> {
        let ids: Vec<String> = self.models().await?.data.into_iter().map(|model| model.id).collect();
        let pick = ids
            .iter()
            .position(|id| id == PREFERRED_MODEL)
            .or_else(|| ids.iter().position(|id| id.starts_with("gpt-4")))
            .or_else(|| (!ids.is_empty()).then_some(0));

        match pick {
            Some(index) => Ok(ids[index].clone()),
            None => Err("openai lists no model".into()),
        }
    }

    async fn chat(&self, request: ChatCompletionParameters) -> Result<ChatCompletionResponse, LlmError> {
        self.chat.chat(request).await
    }

    async fn chat_stream(&self, request: ChatCompletionParameters) -> Result<LlmStream, LlmError> {
        self.chat.chat_stream(request).await
    }

    fn responses(&self) -> Option<ResponsesClient> {
        Some(ResponsesClient::new(self.api_key.clone(), self.base_url.clone()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn info() -> ProviderInfo {
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI (Responses and Chat Completions)",
            env_vars: vec![
                EnvVar::required("OPENAI_API_KEY", "OpenAI API key"),
                EnvVar::optional("OPENAI_BASE_URL", "Override of https://api.openai.com/v1"),
            ],
            responses_api: true,
        }
    }
}
