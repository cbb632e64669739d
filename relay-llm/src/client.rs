use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;
use openai_dive::v1::resources::chat::{ChatCompletionParameters, ChatCompletionResponse, ChatMessage, ChatMessageContent};
use openai_dive::v1::resources::model::ListModelResponse;
use regex::Regex;

use crate::provider::{LlmError, LlmProvider, LlmStream, ProviderInfo};
use crate::providers::openai::OpenAIProvider;
use crate::providers::openai_compatible::OpenAICompatibleProvider;
use crate::responses::ResponsesClient;

/// Providers the client knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Compatible,
}

impl ProviderKind {
    /// Lookup order of `LlmClient::first_from_env`
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAI, ProviderKind::Compatible];

    pub fn info(self) -> ProviderInfo {
        match self {
            ProviderKind::OpenAI => OpenAIProvider::info(),
            ProviderKind::Compatible => OpenAICompatibleProvider::info(),
        }
    }

    fn build(self, values: &HashMap<String, String>) -> Result<Box<dyn LlmProvider>, LlmError> {
        let info = self.info();
        let missing = info.missing(values);
        if !missing.is_empty() {
            return Err(format!("{} needs {}", info.name, missing.join(", ")).into());
        }

        // presence of the required keys was checked above
        let value = |key: &str| values.get(key).cloned().unwrap_or_default();
        let provider: Box<dyn LlmProvider> = match self {
            ProviderKind::OpenAI => Box::new(match values.get("OPENAI_BASE_URL") {
                Some(base_url) => OpenAIProvider::with_base_url(value("OPENAI_API_KEY"), base_url.clone()),
                None => OpenAIProvider::new(value("OPENAI_API_KEY")),
            }),
            ProviderKind::Compatible => Box::new(OpenAICompatibleProvider::new(
                value("OPENAI_COMPATIBLE_API_KEY"),
                value("OPENAI_COMPATIBLE_BASE_URL"),
            )),
        };
        Ok(provider)
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.info().name == name)
            .ok_or_else(|| format!("Unknown provider: {}", name))
    }
}

/// Model endpoint used by the backends, wraps one provider
#[derive(Debug)]
pub struct LlmClient {
    provider: Box<dyn LlmProvider>,
}

impl LlmClient {
    pub fn openai(api_key: String) -> Self {
        Self::from_provider(Box::new(OpenAIProvider::new(api_key)))
    }

    pub fn compatible(api_key: String, base_url: String) -> Self {
        Self::from_provider(Box::new(OpenAICompatibleProvider::new(api_key, base_url)))
    }

    pub fn from_provider(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Build a provider from its name and the values of its variables
    pub fn create_provider(provider_name: &str, env_values: &HashMap<String, String>) -> Result<Self, LlmError> {
        let kind: ProviderKind = provider_name.parse()?;
        Ok(Self::from_provider(kind.build(env_values)?))
    }

    /// Provider named by RELAY_PROVIDER, otherwise the first one whose
    /// variables are all set
    pub fn first_from_env() -> Option<Self> {
        let from_env = |kind: ProviderKind| {
            let values = kind.info().read_process_env();
            kind.build(&values).ok().map(Self::from_provider)
        };

        match std::env::var("RELAY_PROVIDER").ok().and_then(|name| name.parse().ok()) {
            Some(kind) => from_env(kind),
            None => ProviderKind::ALL.into_iter().find_map(from_env),
        }
    }

    pub fn list_providers() -> Vec<ProviderInfo> {
        ProviderKind::ALL.into_iter().map(ProviderKind::info).collect()
    }

    pub async fn models(&self) -> Result<ListModelResponse, LlmError> {
        self.provider.models().await
    }

    /// RELAY_MODEL wins over whatever the provider proposes
    pub async fn default_model(&self) -> Result<String, LlmError> {
        match std::env::var("RELAY_MODEL") {
            Ok(model) if !model.is_empty() => Ok(model),
            _ => self.provider.default_model().await,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    pub fn responses(&self) -> Option<ResponsesClient> {
        self.provider.responses()
    }

    /// Chat completion with `<think>` blocks moved to `reasoning_content`
    pub async fn chat(&self, request: ChatCompletionParameters) -> Result<ChatCompletionResponse, LlmError> {
        let mut response = self.provider.chat(request).await?;
        for choice in &mut response.choices {
            split_think(&mut choice.message);
        }
        Ok(response)
    }

    pub async fn chat_stream(&self, request: ChatCompletionParameters) -> Result<LlmStream, LlmError> {
        self.provider.chat_stream(request).await
    }
}

fn think_regex() -> Option<&'static Regex> {
    static THINK: OnceLock<Option<Regex>> = OnceLock::new();
    THINK.get_or_init(|| Regex::new(r"(?s)<think>(.*?)</think>").ok()).as_ref()
}

/// Reasoning models served through chat completions inline their thoughts
/// in `<think>` tags
pub fn split_think(message: &mut ChatMessage) {
    let ChatMessage::Assistant { reasoning_content, content, .. } = message else {
        return;
    };
    let (Some(regex), Some(ChatMessageContent::Text(text))) = (think_regex(), content.as_ref()) else {
        return;
    };
    let Some(thought) = regex.captures(text).and_then(|c| c.get(1)) else {
        return;
    };

    *reasoning_content = Some(thought.as_str().trim().to_string());
    let answer = regex.replace_all(text, "").trim().to_string();
    *content = (!answer.is_empty()).then_some(ChatMessageContent::Text(answer));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(text: &str) -> ChatMessage {
        ChatMessage::Assistant {
            content: Some(ChatMessageContent::Text(text.to_string())),
            reasoning_content: None,
            refusal: None,
            name: None,
            audio: None,
            tool_calls: None,
        }
    }

    #[test]
    fn test_split_think() {
        let mut message = assistant("<think>\nsunny means warm\n</think>\n\nIt is 21C.");
        split_think(&mut message);
        match message {
            ChatMessage::Assistant { content, reasoning_content, .. } => {
                assert_eq!(reasoning_content.as_deref(), Some("sunny means warm"));
                assert!(matches!(content, Some(ChatMessageContent::Text(t)) if t == "It is 21C."));
            }
            _ => unreachable!(),
        }

        let mut only_thoughts = assistant("<think>hmm</think>");
        split_think(&mut only_thoughts);
        assert!(matches!(only_thoughts, ChatMessage::Assistant { content: None, .. }));

        let mut plain = assistant("no tags");
        split_think(&mut plain);
        assert!(matches!(plain, ChatMessage::Assistant { reasoning_content: None, .. }));
    }

    #[test]
    fn test_create_provider() {
        let mut values = HashMap::new();
        values.insert("OPENAI_COMPATIBLE_API_KEY".to_string(), "key".to_string());

        let missing = LlmClient::create_provider("openai_compatible", &values).unwrap_err();
        assert_eq!(missing.to_string(), "openai_compatible needs OPENAI_COMPATIBLE_BASE_URL");

        values.insert("OPENAI_COMPATIBLE_BASE_URL".to_string(), "http://localhost:8000/v1".to_string());
        let client = LlmClient::create_provider("openai_compatible", &values).unwrap();
        assert_eq!(client.provider_name(), "openai_compatible");
        assert!(client.responses().is_none());

        let unknown = LlmClient::create_provider("mistral", &values).unwrap_err();
        assert_eq!(unknown.to_string(), "Unknown provider: mistral");
    }

    #[test]
    fn test_list_providers() {
        let names: Vec<_> = LlmClient::list_providers().into_iter().map(|info| info.name).collect();
        assert_eq!(names, vec!["openai", "openai_compatible"]);
        assert_eq!("openai".parse::<ProviderKind>(), Ok(ProviderKind::OpenAI));
    }
}
