// Several questions in one conversation, the history is resent on every turn
use relay_llm::{client::LlmClient, provider::LlmError, ChatCompletionParametersBuilder, ChatMessage, ChatMessageContent};

const QUESTIONS: &[&str] = &["Are semicolons optional in JavaScript?", "And what about Python?"];

#[tokio::main]
async fn main() -> Result<(), LlmError> {
    let client = LlmClient::first_from_env().ok_or("no provider configured in the environment")?;
    let model = client.default_model().await?;

    let mut history = vec![ChatMessage::Developer {
        content: ChatMessageContent::Text("Talk like a pirate.".to_string()),
        name: None,
    }];

    for question in QUESTIONS {
        history.push(ChatMessage::User {
            content: ChatMessageContent::Text(question.to_string()),
            name: None,
        });

        let request = ChatCompletionParametersBuilder::default()
            .model(model.clone())
            .messages(history.clone())
            .max_completion_tokens(200u32)
            .build()?;

        let Some(choice) = client.chat(request).await?.choices.into_iter().next() else {
            return Err("empty completion".into());
        };

        let answer = match &choice.message {
            ChatMessage::Assistant { content: Some(ChatMessageContent::Text(text)), .. } => text.clone(),
            _ => "<no text>".to_string(),
        };
        println!("Q: {}\nA: {}\n", question, answer);
        history.push(choice.message);
    }

    Ok(())
}
