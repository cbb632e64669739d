pub mod openai;
pub mod openai_compatible;

#[cfg(test)]
mod tests;

use futures::StreamExt;
use openai_dive::v1::api::Client;
use openai_dive::v1::resources::chat::{ChatCompletionParameters, ChatCompletionResponse};
use openai_dive::v1::resources::model::ListModelResponse;
use tracing::debug;

use crate::provider::{LlmError, LlmStream};

/// Chat completions plumbing shared by the OpenAI flavoured providers
pub(crate) struct ChatEndpoint {
    client: Client,
    base_url: String,
}

fn boxed<E: std::error::Error + Send + Sync + 'static>(error: E) -> LlmError {
    Box::new(error)
}

impl ChatEndpoint {
    pub(crate) fn new(api_key: &str, base_url: &str) -> Self {
        let mut client = Client::new(api_key.to_string());
        client.set_base_url(base_url);
        Self { client, base_url: base_url.to_string() }
    }

    pub(crate) async fn models(&self) -> Result<ListModelResponse, LlmError> {
        debug!(target: "llm::http", base_url = %self.base_url, "GET /models");
        self.client.models().list().await.map_err(boxed)
    }

    pub(crate) async fn chat(&self, request: ChatCompletionParameters) -> Result<ChatCompletionResponse, LlmError> {
        debug!(target: "llm::http", base_url = %self.base_url, model = %request.model, messages = request.messages.len(), "POST /chat/completions");
        self.client.chat().create(request).await.map_err(boxed)
    }

    pub(crate) async fn chat_stream(&self, mut request: ChatCompletionParameters) -> Result<LlmStream, LlmError> {
        request.stream = Some(true);
        debug!(target: "llm::http", base_url = %self.base_url, model = %request.model, "POST /chat/completions (stream)");
        let chunks = self.client.chat().create_stream(request).await.map_err(boxed)?;
        Ok(Box::new(chunks.map(|chunk| chunk.map_err(boxed))))
    }
}
