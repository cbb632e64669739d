use crate::provider::{LlmProvider, LlmError};
use crate::providers::openai::OpenAIProvider;
use crate::providers::openai_compatible::OpenAICompatibleProvider;
use crate::tool::{ToolBox, ToolDescription, FunctionCallingBuilder};
use crate::responses::ToolChoice;
use openai_dive::v1::resources::chat::{ChatCompletionParametersBuilder, ChatMessage, ChatMessageContent, DeltaChatMessage};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;

struct WeatherTool;

impl ToolDescription for WeatherTool {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> &'static str {
        "Get current temperature for provided coordinates in celsius."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "latitude": {"type": "number"},
                "longitude": {"type": "number"}
            },
            "required": ["latitude", "longitude"]
        })
    }
}

fn user(text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::User {
        content: ChatMessageContent::Text(text.to_string()),
        name: None,
    }]
}

// Live checks, each one is skipped when the provider variables are not set

async fn check_models(provider: Box<dyn LlmProvider>) {
    let models = provider.models().await.unwrap_or_else(|e| panic!("{}: /models failed: {:?}", provider.name(), e));
    assert_eq!(models.object, "list");
    assert!(provider.default_model().await.is_ok());
}

async fn check_chat(provider: Box<dyn LlmProvider>) {
    let request = ChatCompletionParametersBuilder::default()
        .model(provider.default_model().await.expect("a model to talk to"))
        .messages(user("Say 'test successful' exactly"))
        .max_completion_tokens(10u32)
        .build()
        .expect("valid parameters");

    let response = provider.chat(request).await.unwrap_or_else(|e| panic!("{}: chat failed: {:?}", provider.name(), e));
    assert!(!response.choices.is_empty());
}

async fn check_chat_stream(provider: Box<dyn LlmProvider>) {
    let request = ChatCompletionParametersBuilder::default()
        .model(provider.default_model().await.expect("a model to talk to"))
        .messages(user("Count from 1 to 3"))
        .max_completion_tokens(20u32)
        .build()
        .expect("valid parameters");

    let mut stream = provider.chat_stream(request).await.unwrap_or_else(|e| panic!("{}: stream failed: {:?}", provider.name(), e));
    let mut chunks = 0;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap_or_else(|e| panic!("{}: broken chunk: {:?}", provider.name(), e));
        chunks += 1;
        if let Some(DeltaChatMessage::Assistant { content: Some(ChatMessageContent::Text(delta)), .. }
            | DeltaChatMessage::Untagged { content: Some(ChatMessageContent::Text(delta)), .. }) = chunk.choices.first().map(|c| &c.delta)
        {
            text.push_str(delta);
        }
    }
    assert!(chunks > 0, "{} streamed nothing", provider.name());
    println!("{} streamed '{}'", provider.name(), text.trim());
}

async fn check_forced_function_call(provider: Box<dyn LlmProvider>) {
    let tools: ToolBox = vec![Arc::new(WeatherTool)];
    let request = ChatCompletionParametersBuilder::default()
        .model(provider.default_model().await.expect("a model to talk to"))
        .messages(user("What's the weather like in Paris today?"))
        .with_function_calling(&tools, &ToolChoice::Function("get_weather".to_string()))
        .expect("get_weather is declared")
        .build()
        .expect("valid parameters");

    let response = provider.chat(request).await.unwrap_or_else(|e| panic!("{}: chat failed: {:?}", provider.name(), e));
    let Some(ChatMessage::Assistant { tool_calls: Some(calls), .. }) = response.choices.first().map(|c| &c.message) else {
        panic!("{} ignored the forced tool", provider.name());
    };
    assert_eq!(calls[0].function.name, "get_weather");
    let args: serde_json::Value = serde_json::from_str(&calls[0].function.arguments).expect("json arguments");
    assert!(args.get("latitude").is_some());
}

fn provider_from_env(name: &str) -> Option<Box<dyn LlmProvider>> {
    match name {
        "openai" => OpenAIProvider::from_env().map(|p| Box::new(p) as Box<dyn LlmProvider>),
        "openai_compatible" => OpenAICompatibleProvider::from_env().map(|p| Box::new(p) as Box<dyn LlmProvider>),
        _ => None,
    }
}

macro_rules! live_provider_tests {
    ($($provider:ident),*) => {
        paste::paste! {
            $(
                #[tokio::test]
                async fn [<test_ $provider _models>]() {
                    match provider_from_env(stringify!($provider)) {
                        Some(provider) => check_models(provider).await,
                        None => println!("skipping {}: not configured", stringify!($provider)),
                    }
                }

                #[tokio::test]
                async fn [<test_ $provider _chat>]() {
                    match provider_from_env(stringify!($provider)) {
                        Some(provider) => check_chat(provider).await,
                        None => println!("skipping {}: not configured", stringify!($provider)),
                    }
                }

                #[tokio::test]
                async fn [<test_ $provider _chat_stream>]() {
                    match provider_from_env(stringify!($provider)) {
                        Some(provider) => check_chat_stream(provider).await,
                        None => println!("skipping {}: not configured", stringify!($provider)),
                    }
                }

                #[tokio::test]
                async fn [<test_ $provider _forced_function_call>]() {
                    match provider_from_env(stringify!($provider)) {
                        Some(provider) => check_forced_function_call(provider).await,
                        None => println!("skipping {}: not configured", stringify!($provider)),
                    }
                }
            )*
        }
    };
}

live_provider_tests!(openai, openai_compatible);

#[test]
fn test_provider_info() {
    let openai = OpenAIProvider::info();
    assert!(openai.responses_api);
    assert!(openai.env_vars.iter().any(|v| v.name == "OPENAI_API_KEY" && v.required));

    let compatible = OpenAICompatibleProvider::info();
    assert!(!compatible.responses_api);
    assert_eq!(compatible.env_vars.len(), 2);
}

#[test]
fn test_openai_provider_exposes_responses_client() {
    let provider = OpenAIProvider::with_base_url("sk-test".to_string(), "http://localhost:9999/v1/".to_string());
    let client = provider.responses().expect("openai speaks the responses api");
    assert_eq!(client.base_url, "http://localhost:9999/v1");
    assert_eq!(client.api_key, "sk-test");

    let compatible = OpenAICompatibleProvider::new("key".to_string(), "http://localhost:9999/v1".to_string());
    assert!(compatible.responses().is_none());
}

mod http {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serving_models(ids: &[&str]) -> MockServer {
        let server = MockServer::start().await;
        let data: Vec<_> = ids
            .iter()
            .map(|id| json!({"id": id, "object": "model", "created": 0, "owned_by": "system"}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": data})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_openai_default_model_preference() {
        let server = serving_models(&["o4-mini", "gpt-4o", "gpt-4.1"]).await;
        let provider = OpenAIProvider::with_base_url("sk-test".into(), format!("{}/v1", server.uri()));
        assert_eq!(provider.default_model().await.unwrap(), "gpt-4.1");

        let server = serving_models(&["o4-mini", "gpt-4o"]).await;
        let provider = OpenAIProvider::with_base_url("sk-test".into(), format!("{}/v1", server.uri()));
        assert_eq!(provider.default_model().await.unwrap(), "gpt-4o");

        let server = serving_models(&[]).await;
        let provider = OpenAIProvider::with_base_url("sk-test".into(), format!("{}/v1", server.uri()));
        assert!(provider.default_model().await.is_err());
    }

    #[tokio::test]
    async fn test_compatible_default_model_is_first_listed() {
        let server = serving_models(&["llama-3.1-8b", "qwen"]).await;
        let provider = OpenAICompatibleProvider::new("key".into(), format!("{}/v1", server.uri()));
        assert_eq!(provider.default_model().await.unwrap(), "llama-3.1-8b");
    }
}
