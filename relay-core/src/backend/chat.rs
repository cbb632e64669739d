use std::sync::Arc;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;
use relay_llm::responses::{IncompleteReason, ToolChoice};
use relay_llm::{
    ChatCompletionParameters, ChatCompletionParametersBuilder, ChatMessage, ChatMessageContent,
    DeltaChatMessage, Function, FunctionCallingBuilder, LlmClient, LlmError, ToolBox, ToolCall,
    ToolDescription,
};

use crate::conversation::{Conversation, Message, ToolInvocation};
use crate::roundtrip::declaration::ToolDeclaration;
use crate::tools::AnyTool;
use super::types::{ModelReply, ModelRequest, ReplyStatus, ReplyStream, RequestInput, StreamEvent};
use super::ModelBackend;

/// Backend over Chat Completions
///
/// Only local functions are supported and the whole conversation is sent
/// on every submission.
pub struct ChatBackend {
    client: Arc<LlmClient>,
}

impl ChatBackend {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    pub fn build_request(&self, request: &ModelRequest) -> Result<ChatCompletionParameters, LlmError> {
        let RequestInput::Conversation(conversation) = &request.input else {
            return Err("chat completions cannot chain on a previous response, resend the conversation".into());
        };
        if request.output_schema.is_some() {
            return Err("structured output requires the responses backend".into());
        }
        if matches!(request.tool_choice, ToolChoice::Hosted(_)) {
            return Err("hosted tool choice requires the responses backend".into());
        }

        let mut toolbox: ToolBox = Vec::new();
        for declaration in &request.declarations {
            match declaration {
                ToolDeclaration::Local(tool) => toolbox.push(Arc::new(DeclaredTool(tool.clone()))),
                other => {
                    return Err(format!("{:?} is not supported by chat completions", other).into());
                }
            }
        }

        let mut messages = Vec::new();
        if let Some(instructions) = &request.instructions {
            messages.push(ChatMessage::Developer {
                content: ChatMessageContent::Text(instructions.clone()),
                name: None,
            });
        }
        messages.extend(chat_messages(conversation));

        let mut builder = ChatCompletionParametersBuilder::default();
        builder.model(request.model.clone()).messages(messages);
        if let Some(max) = request.max_output_tokens {
            builder.max_completion_tokens(max);
        }
        if let Some(temperature) = request.temperature {
            builder.temperature(temperature);
        }
        builder.with_function_calling(&toolbox, &request.tool_choice)?;

        builder.build().map_err(|e| format!("Failed to build request: {}", e).into())
    }
}

#[async_trait]
impl ModelBackend for ChatBackend {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn supports_chaining(&self) -> bool {
        false
    }

    async fn submit(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        let params = self.build_request(request)?;
        let response = self.client.chat(params).await?;

        let choice = response.choices.into_iter().next().ok_or("no choice in chat completion")?;
        let status = match finish_reason(&choice.finish_reason).as_deref() {
            Some("length") => ReplyStatus::Incomplete(IncompleteReason::MaxOutputTokens),
            Some("content_filter") => ReplyStatus::Incomplete(IncompleteReason::ContentFilter),
            _ => ReplyStatus::Complete,
        };

        let mut reply = ModelReply::text("");
        reply.status = status;
        if let ChatMessage::Assistant { content, tool_calls, refusal, .. } = choice.message {
            if let Some(ChatMessageContent::Text(text)) = content {
                reply.text = text;
            }
            reply.refusal = refusal.filter(|r| !r.is_empty());
            reply.invocations = tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolInvocation::new(call.id, call.function.name, call.function.arguments))
                .collect();
        }
        Ok(reply)
    }

    async fn submit_stream(&self, request: &ModelRequest) -> Result<ReplyStream, LlmError> {
        if !request.declarations.is_empty() {
            return Err("chat completions streaming is limited to text, use submit for tools".into());
        }
        let params = self.build_request(request)?;
        let mut chunks = self.client.chat_stream(params).await?;

        let stream = async_stream::stream! {
            let mut text = String::new();
            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let Some(choice) = chunk.choices.first() else { continue };
                match &choice.delta {
                    DeltaChatMessage::Assistant { content: Some(ChatMessageContent::Text(delta)), .. }
                    | DeltaChatMessage::Untagged { content: Some(ChatMessageContent::Text(delta)), .. } => {
                        text.push_str(delta);
                        yield Ok(StreamEvent::ContentDelta(delta.clone()));
                    }
                    _ => {
                        debug!(target: "roundtrip::stream", "skipping chunk without text");
                    }
                }
            }
            yield Ok(StreamEvent::Completed(ModelReply::text(text)));
        };

        Ok(Box::pin(stream))
    }
}

/// Messages replaying a conversation for chat completions
pub fn chat_messages(conversation: &Conversation) -> Vec<ChatMessage> {
    conversation
        .messages()
        .iter()
        .map(|message| match message {
            Message::System { content } => ChatMessage::System {
                content: ChatMessageContent::Text(content.clone()),
                name: None,
            },
            Message::Developer { content } => ChatMessage::Developer {
                content: ChatMessageContent::Text(content.clone()),
                name: None,
            },
            Message::User { content } => ChatMessage::User {
                content: ChatMessageContent::Text(content.clone()),
                name: None,
            },
            Message::Assistant { content, invocations } => ChatMessage::Assistant {
                content: content.clone().map(ChatMessageContent::Text),
                reasoning_content: None,
                tool_calls: if invocations.is_empty() {
                    None
                } else {
                    Some(invocations.iter().map(tool_call).collect())
                },
                refusal: None,
                name: None,
                audio: None,
            },
            Message::Tool { invocation_id, content, .. } => ChatMessage::Tool {
                content: content.clone(),
                tool_call_id: invocation_id.clone(),
            },
        })
        .collect()
}

fn tool_call(invocation: &ToolInvocation) -> ToolCall {
    ToolCall {
        id: invocation.id.clone(),
        r#type: "function".to_string(),
        function: Function {
            name: invocation.name.clone(),
            arguments: invocation.arguments.clone(),
        },
    }
}

fn finish_reason<T: serde::Serialize>(reason: &T) -> Option<String> {
    match serde_json::to_value(reason) {
        Ok(Value::String(reason)) => Some(reason),
        _ => None,
    }
}

/// Exposes a local tool through the description trait used by the chat builder
struct DeclaredTool(Arc<dyn AnyTool>);

impl ToolDescription for DeclaredTool {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn description(&self) -> &'static str {
        self.0.description()
    }

    fn parameters_schema(&self) -> Value {
        self.0.parameters_schema()
    }
}
