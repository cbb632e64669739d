use std::collections::HashMap;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;
use relay_llm::LlmError;
use relay_llm::responses::{
    IncompleteReason, InputItem, OutputItem, Response, ResponseInput, ResponseRequest,
    ResponseStatus, ResponseStreamEvent, ResponsesClient, Role, TextFormat,
};

use crate::conversation::{Conversation, Message, ToolInvocation};
use super::types::{
    ApprovalRequest, ContinuationItem, ModelReply, ModelRequest, RemoteCall, ReplyStatus,
    ReplyStream, RequestInput, StreamEvent,
};
use super::ModelBackend;

/// Backend over the Responses API, the only one supporting hosted tools,
/// protocol servers, approvals and chained submissions
pub struct ResponsesBackend {
    client: ResponsesClient,
}

impl ResponsesBackend {
    pub fn new(client: ResponsesClient) -> Self {
        Self { client }
    }

    pub fn from_env() -> Result<Self, LlmError> {
        ResponsesClient::from_env()
            .map(Self::new)
            .ok_or_else(|| "OPENAI_API_KEY is not set".into())
    }

    pub fn client(&self) -> &ResponsesClient {
        &self.client
    }

    pub fn build_request(&self, request: &ModelRequest) -> ResponseRequest {
        let (input, previous) = match &request.input {
            RequestInput::Conversation(conversation) => (conversation_items(conversation), None),
            RequestInput::Continuation { previous_response_id, items } => (
                items.iter().map(continuation_item).collect(),
                Some(previous_response_id.clone()),
            ),
        };

        let mut body = ResponseRequest::new(&request.model, ResponseInput::Items(input));
        body.instructions = request.instructions.clone();
        body.previous_response_id = previous;
        body.tools = request.declarations.iter().map(|d| d.to_hosted()).collect();
        if !body.tools.is_empty() {
            body.tool_choice = Some(request.tool_choice.clone());
        }
        body.max_output_tokens = request.max_output_tokens;
        body.include = request.include.clone();
        body.temperature = request.temperature;
        if let Some(effort) = request.reasoning {
            body = body.reasoning(effort);
        }
        if let Some(schema) = &request.output_schema {
            body = body.text_format(TextFormat::JsonSchema {
                name: schema.name.clone(),
                schema: schema.schema.clone(),
                strict: true,
            });
        }
        body
    }
}

#[async_trait]
impl ModelBackend for ResponsesBackend {
    fn name(&self) -> &'static str {
        "responses"
    }

    fn supports_chaining(&self) -> bool {
        true
    }

    async fn submit(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        let body = self.build_request(request);
        let response = self.client.create(&body).await?;
        reply_from_response(response)
    }

    async fn submit_stream(&self, request: &ModelRequest) -> Result<ReplyStream, LlmError> {
        let body = self.build_request(request);
        let mut events = self.client.create_stream(&body).await?;

        let stream = async_stream::stream! {
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(Box::new(e) as LlmError);
                        break;
                    }
                };

                let terminal = event.is_terminal();
                match event {
                    ResponseStreamEvent::OutputTextDelta { delta, .. } => {
                        yield Ok(StreamEvent::ContentDelta(delta));
                    }
                    ResponseStreamEvent::RefusalDelta { delta, .. } => {
                        yield Ok(StreamEvent::RefusalDelta(delta));
                    }
                    ResponseStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                        yield Ok(StreamEvent::ToolArgumentsDelta { item_id, delta });
                    }
                    ResponseStreamEvent::Completed { response }
                    | ResponseStreamEvent::Incomplete { response }
                    | ResponseStreamEvent::Failed { response } => {
                        match reply_from_response(response) {
                            Ok(reply) => yield Ok(StreamEvent::Completed(reply)),
                            Err(e) => yield Ok(StreamEvent::Error(e.to_string())),
                        }
                    }
                    ResponseStreamEvent::Error { message, .. } => {
                        yield Ok(StreamEvent::Error(message));
                    }
                    other => {
                        debug!(target: "roundtrip::stream", "skipping event {:?}", other);
                    }
                }

                if terminal {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Input items replaying a whole conversation
///
/// Calls made by protocol servers have no input item of their own, their
/// outcome is replayed as assistant text.
pub fn conversation_items(conversation: &Conversation) -> Vec<InputItem> {
    let mut remote: HashMap<&str, &ToolInvocation> = HashMap::new();
    let mut items = Vec::new();

    for message in conversation.messages() {
        match message {
            Message::System { content } => items.push(InputItem::message(Role::System, content.clone())),
            Message::Developer { content } => items.push(InputItem::message(Role::Developer, content.clone())),
            Message::User { content } => items.push(InputItem::message(Role::User, content.clone())),
            Message::Assistant { content, invocations } => {
                if let Some(content) = content.as_ref().filter(|c| !c.is_empty()) {
                    items.push(InputItem::message(Role::Assistant, content.clone()));
                }
                for invocation in invocations {
                    match &invocation.server_label {
                        Some(_) => {
                            remote.insert(invocation.id.as_str(), invocation);
                        }
                        None => items.push(InputItem::FunctionCall {
                            call_id: invocation.id.clone(),
                            name: invocation.name.clone(),
                            arguments: invocation.arguments.clone(),
                        }),
                    }
                }
            }
            Message::Tool { invocation_id, content, .. } => match remote.get(invocation_id.as_str()) {
                Some(invocation) => items.push(InputItem::message(
                    Role::Assistant,
                    format!(
                        "{} on {} returned: {}",
                        invocation.name,
                        invocation.server_label.as_deref().unwrap_or_default(),
                        content
                    ),
                )),
                None => items.push(InputItem::function_output(invocation_id.clone(), content.clone())),
            },
        }
    }

    items
}

fn continuation_item(item: &ContinuationItem) -> InputItem {
    match item {
        ContinuationItem::Message(Message::Tool { invocation_id, content, .. }) => {
            InputItem::function_output(invocation_id.clone(), content.clone())
        }
        ContinuationItem::Message(Message::System { content }) => InputItem::message(Role::System, content.clone()),
        ContinuationItem::Message(Message::Developer { content }) => InputItem::message(Role::Developer, content.clone()),
        ContinuationItem::Message(Message::Assistant { content, .. }) => {
            InputItem::message(Role::Assistant, content.clone().unwrap_or_default())
        }
        ContinuationItem::Message(Message::User { content }) => InputItem::user(content.clone()),
        ContinuationItem::Approval(decision) => InputItem::McpApprovalResponse {
            approval_request_id: decision.request_id.clone(),
            approve: decision.approve,
            reason: decision.reason.clone(),
        },
    }
}

/// Flatten a Responses API body into a reply
///
/// A failed response is an error, an incomplete one keeps its partial output.
pub fn reply_from_response(response: Response) -> Result<ModelReply, LlmError> {
    if response.status == ResponseStatus::Failed {
        let message = response
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "response failed".to_string());
        return Err(format!("response {} failed: {}", response.id, message).into());
    }

    let status = match response.status {
        ResponseStatus::Incomplete => ReplyStatus::Incomplete(
            response.incomplete_reason().cloned().unwrap_or(IncompleteReason::Other),
        ),
        _ => ReplyStatus::Complete,
    };

    let invocations = response
        .function_calls()
        .into_iter()
        .map(|(call_id, name, arguments)| ToolInvocation::new(call_id, name, arguments))
        .collect();

    let approval_requests = response
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::McpApprovalRequest { id, server_label, name, arguments } => Some(ApprovalRequest {
                id: id.clone(),
                server_label: server_label.clone(),
                tool_name: name.clone(),
                arguments: arguments.clone(),
            }),
            _ => None,
        })
        .collect();

    let remote_calls = response
        .mcp_calls()
        .into_iter()
        .map(|call| RemoteCall {
            id: call.id.to_string(),
            server_label: call.server_label.to_string(),
            name: call.name.to_string(),
            arguments: call.arguments.to_string(),
            output: call.output.map(str::to_string),
            error: call.error,
        })
        .collect();

    Ok(ModelReply {
        response_id: Some(response.id.clone()),
        text: response.output_text(),
        refusal: response.refusal(),
        invocations,
        approval_requests,
        remote_calls,
        images: response.images().into_iter().map(str::to_string).collect(),
        status,
    })
}
