// One chat completion against whichever provider the environment configures
use relay_llm::{client::LlmClient, provider::LlmError, ChatCompletionParametersBuilder, ChatMessage, ChatMessageContent};

#[tokio::main]
async fn main() -> Result<(), LlmError> {
    // OPENAI_API_KEY, or OPENAI_COMPATIBLE_API_KEY and OPENAI_COMPATIBLE_BASE_URL
    let client = LlmClient::first_from_env().ok_or("no provider configured in the environment")?;
    let model = client.default_model().await?;
    println!("{} / {}", client.provider_name(), model);

    let request = ChatCompletionParametersBuilder::default()
        .model(model)
        .messages(vec![ChatMessage::User {
            content: ChatMessageContent::Text("Write a one-sentence bedtime story about a unicorn.".to_string()),
            name: None,
        }])
        .max_completion_tokens(100u32)
        .build()?;

    let response = client.chat(request).await?;
    let Some(ChatMessage::Assistant { content, reasoning_content, .. }) = response.choices.first().map(|c| &c.message) else {
        return Err("no assistant message".into());
    };

    if let Some(thoughts) = reasoning_content {
        println!("(thinking) {}", thoughts);
    }
    match content {
        Some(ChatMessageContent::Text(text)) => println!("{}", text),
        _ => println!("<no text>"),
    }
    Ok(())
}
