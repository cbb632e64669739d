// Conversation state kept by the provider, chained with previous_response_id
use relay_llm::provider::LlmError;
use relay_llm::responses::{IncompleteReason, ReasoningEffort, ResponseRequest, ResponsesClient};

#[tokio::main]
async fn main() -> Result<(), LlmError> {
    let client = ResponsesClient::from_env()
        .ok_or("OPENAI_API_KEY environment variable not set")?;

    let first = client
        .create(&ResponseRequest::new("gpt-4o-mini", "tell me a joke").store(true))
        .await?;
    println!("{}", first.output_text());

    let second = client
        .create(
            &ResponseRequest::new("gpt-4o-mini", "tell me another")
                .previous_response_id(first.id.clone()),
        )
        .await?;
    println!("{}", second.output_text());

    // a tight token budget leaves the answer incomplete
    let truncated = client
        .create(
            &ResponseRequest::new("o4-mini", "Write a bash script that transposes a matrix given as '[1,2],[3,4],[5,6]'")
                .reasoning(ReasoningEffort::Medium)
                .max_output_tokens(300),
        )
        .await?;

    match truncated.incomplete_reason() {
        Some(IncompleteReason::MaxOutputTokens) => {
            let partial = truncated.output_text();
            if partial.is_empty() {
                println!("Ran out of tokens during reasoning");
            } else {
                println!("Partial output: {}", partial);
            }
        }
        Some(reason) => println!("Incomplete: {:?}", reason),
        None => println!("{}", truncated.output_text()),
    }

    Ok(())
}
