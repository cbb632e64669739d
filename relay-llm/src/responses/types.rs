use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tools::{HostedTool, ToolChoice};

/// Role of an input message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
}

/// Input of a response request: either a single prompt or a list of items
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseInput {
    Text(String),
    Items(Vec<InputItem>),
}

impl From<&str> for ResponseInput {
    fn from(text: &str) -> Self {
        ResponseInput::Text(text.to_string())
    }
}

impl From<String> for ResponseInput {
    fn from(text: String) -> Self {
        ResponseInput::Text(text)
    }
}

impl From<Vec<InputItem>> for ResponseInput {
    fn from(items: Vec<InputItem>) -> Self {
        ResponseInput::Items(items)
    }
}

/// A single item of the input list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: Role,
        content: String,
    },
    /// echo of a function call previously emitted by the model
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
    McpApprovalResponse {
        approval_request_id: String,
        approve: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl InputItem {
    pub fn message(role: Role, content: impl Into<String>) -> Self {
        InputItem::Message { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::message(Role::User, content)
    }

    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        InputItem::FunctionCallOutput { call_id: call_id.into(), output: output.into() }
    }

    pub fn approval(approval_request_id: impl Into<String>, approve: bool) -> Self {
        InputItem::McpApprovalResponse {
            approval_request_id: approval_request_id.into(),
            approve,
            reason: None,
        }
    }
}

/// Output format requested in `text.format`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextFormat {
    Text,
    JsonObject,
    JsonSchema {
        name: String,
        schema: Value,
        strict: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextConfig {
    pub format: TextFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub effort: ReasoningEffort,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Body of `POST /responses`
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRequest {
    pub model: String,
    pub input: ResponseInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<HostedTool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "super::tools::serialize_tool_choice"
    )]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ResponseRequest {
    pub fn new(model: impl Into<String>, input: impl Into<ResponseInput>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            instructions: None,
            tools: vec![],
            tool_choice: None,
            previous_response_id: None,
            max_output_tokens: None,
            text: None,
            reasoning: None,
            include: vec![],
            store: None,
            stream: None,
            temperature: None,
        }
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn tools(mut self, tools: Vec<HostedTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool(mut self, tool: HostedTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn text_format(mut self, format: TextFormat) -> Self {
        self.text = Some(TextConfig { format });
        self
    }

    pub fn reasoning(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning = Some(ReasoningConfig { effort, summary: None });
        self
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.include.push(field.into());
        self
    }

    pub fn store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    Incomplete,
    InProgress,
    Failed,
    Cancelled,
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    MaxOutputTokens,
    ContentFilter,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteDetails {
    pub reason: IncompleteReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Content part of an output message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputContent {
    #[serde(rename = "output_text")]
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Value>,
    },
    #[serde(rename = "refusal")]
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSearchResult {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
}

/// An item of the response output list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default)]
        id: String,
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
    McpListTools {
        id: String,
        server_label: String,
        #[serde(default)]
        tools: Vec<McpToolInfo>,
        #[serde(default)]
        error: Option<String>,
    },
    McpCall {
        id: String,
        server_label: String,
        name: String,
        arguments: String,
        #[serde(default)]
        output: Option<String>,
        /// string or object depending on the failure
        #[serde(default)]
        error: Option<Value>,
        #[serde(default)]
        approval_request_id: Option<String>,
    },
    McpApprovalRequest {
        id: String,
        server_label: String,
        name: String,
        arguments: String,
    },
    WebSearchCall {
        id: String,
        #[serde(default)]
        status: Option<String>,
    },
    FileSearchCall {
        id: String,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        queries: Vec<String>,
        #[serde(default)]
        results: Option<Vec<FileSearchResult>>,
    },
    ImageGenerationCall {
        id: String,
        #[serde(default)]
        status: Option<String>,
        /// base64 encoded image
        #[serde(default)]
        result: Option<String>,
    },
    Reasoning {
        id: String,
        #[serde(default)]
        summary: Vec<Value>,
    },
    #[serde(other)]
    Unknown,
}

/// Borrowed view on an `mcp_call` output item
#[derive(Debug, Clone, PartialEq)]
pub struct McpCallView<'a> {
    pub id: &'a str,
    pub server_label: &'a str,
    pub name: &'a str,
    pub arguments: &'a str,
    pub output: Option<&'a str>,
    pub error: Option<String>,
}

/// Body returned by `POST /responses` and `GET /responses/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
}

impl Response {
    /// Concatenation of every `output_text` part, in output order
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content, .. } => Some(content),
                _ => None,
            })
            .flatten()
            .filter_map(|part| match part {
                OutputContent::OutputText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn refusal(&self) -> Option<String> {
        let refusals: Vec<&str> = self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content, .. } => Some(content),
                _ => None,
            })
            .flatten()
            .filter_map(|part| match part {
                OutputContent::Refusal { refusal } => Some(refusal.as_str()),
                _ => None,
            })
            .collect();

        if refusals.is_empty() { None } else { Some(refusals.join("\n")) }
    }

    /// (call_id, name, arguments) of every function call
    pub fn function_calls(&self) -> Vec<(&str, &str, &str)> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall { call_id, name, arguments, .. } => {
                    Some((call_id.as_str(), name.as_str(), arguments.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn approval_requests(&self) -> Vec<&OutputItem> {
        self.output
            .iter()
            .filter(|item| matches!(item, OutputItem::McpApprovalRequest { .. }))
            .collect()
    }

    pub fn mcp_calls(&self) -> Vec<McpCallView<'_>> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::McpCall { id, server_label, name, arguments, output, error, .. } => {
                    Some(McpCallView {
                        id,
                        server_label,
                        name,
                        arguments,
                        output: output.as_deref(),
                        error: error.as_ref().map(error_message),
                    })
                }
                _ => None,
            })
            .collect()
    }

    /// base64 payloads of generated images
    pub fn images(&self) -> Vec<&str> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::ImageGenerationCall { result: Some(result), .. } => Some(result.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_incomplete(&self) -> bool {
        self.status == ResponseStatus::Incomplete
    }

    pub fn incomplete_reason(&self) -> Option<&IncompleteReason> {
        self.incomplete_details.as_ref().map(|d| &d.reason)
    }
}

/// Flatten an error payload that can be a plain string or an object with a message
pub fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
