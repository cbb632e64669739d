// Function calling example: get_weather declared, executed locally and fed back
use relay_llm::{client::LlmClient, provider::LlmError, ChatCompletionParametersBuilder, ChatMessage,
               ChatMessageContent, FunctionCallingBuilder, ToolBox, ToolDescription};
use relay_llm::responses::ToolChoice;
use serde_json::{json, Value};
use std::sync::Arc;

struct GetWeather;

impl ToolDescription for GetWeather {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> &'static str {
        "Get current temperature for provided coordinates in celsius."
    }

    fn parameters_schema(&self) -> Value {
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

async fn get_weather(arguments: &str) -> Result<String, LlmError> {
    let args: Value = serde_json::from_str(arguments)?;
    let url = format!(
        "https://api.open-meteo.com/v1/forecast?latitude={}&longitude={}&current=temperature_2m",
        args["latitude"], args["longitude"]
    );
    let body: Value = reqwest::get(url).await?.json().await?;
    Ok(body["current"]["temperature_2m"].to_string())
}

#[tokio::main]
async fn main() -> Result<(), LlmError> {
    let client = LlmClient::first_from_env()
        .ok_or("no provider configured in the environment")?;
    let model = client.default_model().await?;
    println!("Using model: {}", model);

    let tools: ToolBox = vec![Arc::new(GetWeather)];
    let mut messages = vec![ChatMessage::User {
        content: ChatMessageContent::Text("What's the weather like in Paris today?".to_string()),
        name: None,
    }];

    let request = ChatCompletionParametersBuilder::default()
        .model(model.clone())
        .messages(messages.clone())
        .with_function_calling(&tools, &ToolChoice::Auto)?
        .build()
        .map_err(|e| format!("Failed to build parameters: {:?}", e))?;

    let response = client.chat(request).await?;
    let message = response.choices.first().ok_or("no choice returned")?.message.clone();
    messages.push(message.clone());

    let ChatMessage::Assistant { tool_calls: Some(tool_calls), .. } = message else {
        println!("Direct response (no function call): {:?}", message);
        return Ok(());
    };

    for tool_call in &tool_calls {
        println!("{}({})", tool_call.function.name, tool_call.function.arguments);
        let content = match tool_call.function.name.as_str() {
            "get_weather" => get_weather(&tool_call.function.arguments).await
                .unwrap_or_else(|e| format!("error: {}", e)),
            other => format!("error: unknown tool {}", other),
        };
        messages.push(ChatMessage::Tool { content, tool_call_id: tool_call.id.clone() });
    }

    let follow_up = ChatCompletionParametersBuilder::default()
        .model(model)
        .messages(messages)
        .with_function_calling(&tools, &ToolChoice::Auto)?
        .build()
        .map_err(|e| format!("Failed to build parameters: {:?}", e))?;

    let final_response = client.chat(follow_up).await?;
    if let Some(ChatMessage::Assistant { content: Some(ChatMessageContent::Text(text)), .. }) =
        final_response.choices.first().map(|c| &c.message)
    {
        println!("\nFinal response: {}", text);
    }

    Ok(())
}
