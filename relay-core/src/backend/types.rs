use std::pin::Pin;
use futures::Stream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use relay_llm::LlmError;
use relay_llm::responses::{IncompleteReason, ReasoningEffort, ToolChoice};
use relay_llm::tool::schema_of;

use crate::conversation::{Conversation, Message, ToolInvocation};
use crate::roundtrip::declaration::ToolDeclaration;

/// A protocol server tool call waiting for the caller's consent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub server_label: String,
    pub tool_name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub request_id: String,
    pub approve: bool,
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub fn approve(request_id: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), approve: true, reason: None }
    }

    pub fn deny(request_id: impl Into<String>, reason: Option<String>) -> Self {
        Self { request_id: request_id.into(), approve: false, reason }
    }
}

/// A protocol server call the provider already made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub id: String,
    pub server_label: String,
    pub name: String,
    pub arguments: String,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Item of a chained submission
#[derive(Debug, Clone, PartialEq)]
pub enum ContinuationItem {
    /// a user or tool message the provider has not seen yet
    Message(Message),
    Approval(ApprovalDecision),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestInput {
    /// the whole conversation is sent
    Conversation(Conversation),
    /// only new items are sent, the provider resolves the rest from its stored response
    Continuation {
        previous_response_id: String,
        items: Vec<ContinuationItem>,
    },
}

/// Schema the final answer must conform to
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self { name: name.into(), schema }
    }

    /// Strict schema of a Rust type
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self::new(name, schema_of::<T>())
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub instructions: Option<String>,
    pub input: RequestInput,
    pub declarations: Vec<ToolDeclaration>,
    pub tool_choice: ToolChoice,
    pub max_output_tokens: Option<u32>,
    pub output_schema: Option<OutputSchema>,
    pub reasoning: Option<ReasoningEffort>,
    pub include: Vec<String>,
    pub temperature: Option<f32>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, input: RequestInput) -> Self {
        Self {
            model: model.into(),
            instructions: None,
            input,
            declarations: vec![],
            tool_choice: ToolChoice::Auto,
            max_output_tokens: None,
            output_schema: None,
            reasoning: None,
            include: vec![],
            temperature: None,
        }
    }

    pub fn previous_response_id(&self) -> Option<&str> {
        match &self.input {
            RequestInput::Continuation { previous_response_id, .. } => Some(previous_response_id),
            RequestInput::Conversation(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyStatus {
    Complete,
    Incomplete(IncompleteReason),
}

/// What the model answered to one submission
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    /// provider reference used to chain the next submission
    pub response_id: Option<String>,
    pub text: String,
    pub refusal: Option<String>,
    pub invocations: Vec<ToolInvocation>,
    pub approval_requests: Vec<ApprovalRequest>,
    pub remote_calls: Vec<RemoteCall>,
    /// base64 encoded generated images
    pub images: Vec<String>,
    pub status: ReplyStatus,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            response_id: None,
            text: text.into(),
            refusal: None,
            invocations: vec![],
            approval_requests: vec![],
            remote_calls: vec![],
            images: vec![],
            status: ReplyStatus::Complete,
        }
    }

    pub fn with_id(mut self, response_id: impl Into<String>) -> Self {
        self.response_id = Some(response_id.into());
        self
    }

    pub fn with_invocation(mut self, invocation: ToolInvocation) -> Self {
        self.invocations.push(invocation);
        self
    }

    pub fn with_approval_request(mut self, request: ApprovalRequest) -> Self {
        self.approval_requests.push(request);
        self
    }

    pub fn with_remote_call(mut self, call: RemoteCall) -> Self {
        self.remote_calls.push(call);
        self
    }

    pub fn with_refusal(mut self, refusal: impl Into<String>) -> Self {
        self.refusal = Some(refusal.into());
        self
    }

    pub fn incomplete(mut self, reason: IncompleteReason) -> Self {
        self.status = ReplyStatus::Incomplete(reason);
        self
    }
}

/// Incremental events of a streamed submission, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ContentDelta(String),
    RefusalDelta(String),
    /// a fragment of the arguments of a function call, split arbitrarily
    ToolArgumentsDelta { item_id: String, delta: String },
    Completed(ModelReply),
    Error(String),
}

pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;
