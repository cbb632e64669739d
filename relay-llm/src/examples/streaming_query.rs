// Streaming query example over the Responses API
use futures::StreamExt;
use relay_llm::provider::LlmError;
use relay_llm::responses::{ResponseRequest, ResponseStreamEvent, ResponsesClient};
use std::io::{self, Write};

#[tokio::main]
async fn main() -> Result<(), LlmError> {
    let client = ResponsesClient::from_env()
        .ok_or("OPENAI_API_KEY environment variable not set")?;

    let request = ResponseRequest::new("gpt-4.1", "Say 'double bubble bath' ten times fast.");
    let mut stream = client.create_stream(&request).await?;

    println!("Streaming response:");
    println!("==================");

    let mut full_response = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            ResponseStreamEvent::OutputTextDelta { delta, .. } => {
                print!("{}", delta);
                full_response.push_str(&delta);
                io::stdout().flush()?;
            }
            ResponseStreamEvent::Error { message, .. } => {
                eprintln!("\nstream error: {}", message);
                break;
            }
            event => {
                if let Some(response) = event.final_response() {
                    println!("\n\n==================");
                    println!("status: {:?}, {} characters", response.status, full_response.len());
                }
            }
        }
    }

    Ok(())
}
