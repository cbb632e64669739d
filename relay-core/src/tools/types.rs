use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use relay_llm::responses::HostedTool;
use relay_llm::tool::{chat_tool, function_tool};
use relay_llm::{ChatCompletionTool, ToolDescription};

/// What a local tool is allowed to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolCapability {
    Read,
    Write,
    Network,
}

/// Result of a local tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolResult {
    Success {
        output: String,
        metadata: Option<HashMap<String, Value>>,
    },
    Error {
        error: String,
        metadata: Option<HashMap<String, Value>>,
    },
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        ToolResult::Success { output, metadata: None }
    }

    pub fn error(error: String) -> Self {
        ToolResult::Error { error, metadata: None }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub fn metadata(&self) -> Option<&HashMap<String, Value>> {
        match self {
            ToolResult::Success { metadata, .. } | ToolResult::Error { metadata, .. } => metadata.as_ref(),
        }
    }
}

/// Why an invocation could not be satisfied
///
/// A failure is never raised to the caller of the round trip, it is encoded
/// into the tool message answering the invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ToolFailure {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("remote tool error: {0}")]
    Remote(String),

    #[error("tool call cancelled before completion")]
    Cancelled,

    #[error("tool '{tool}' needs the {capability:?} capability, which is not granted")]
    NotPermitted { tool: String, capability: ToolCapability },
}

/// Parameters of a tool that takes none
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ToolEmptyParams {}

/// A local tool with typed parameters, usually implemented through `#[tool]`
#[async_trait]
pub trait Tool: ToolDescription + Send + Sync {
    type Params: DeserializeOwned + JsonSchema + Send;

    fn capabilities(&self) -> &'static [ToolCapability];

    async fn execute(&self, params: Self::Params) -> ToolResult;
}

/// Type erased tool, dispatched on raw JSON arguments
#[async_trait]
pub trait AnyTool: ToolDescription + Send + Sync {
    fn tool_capabilities(&self) -> &'static [ToolCapability];

    /// Decode the arguments and run the tool
    async fn execute_json(&self, arguments: Value) -> Result<ToolResult, ToolFailure>;

    /// Declaration for the chat completions API
    fn to_openai(&self) -> ChatCompletionTool;

    /// Declaration for the responses API
    fn to_function_tool(&self) -> HostedTool;
}

#[async_trait]
impl<T> AnyTool for T
where
    T: Tool + 'static,
{
    fn tool_capabilities(&self) -> &'static [ToolCapability] {
        self.capabilities()
    }

    async fn execute_json(&self, arguments: Value) -> Result<ToolResult, ToolFailure> {
        let params: T::Params = serde_json::from_value(arguments).map_err(|e| ToolFailure::InvalidArguments {
            tool: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.execute(params).await)
    }

    fn to_openai(&self) -> ChatCompletionTool {
        chat_tool(self)
    }

    fn to_function_tool(&self) -> HostedTool {
        function_tool(self)
    }
}

/// The set of local tools offered to the model
pub type AnyToolBox = Vec<Arc<dyn AnyTool>>;

pub trait ToolLookup {
    fn find_tool(&self, name: &str) -> Option<Arc<dyn AnyTool>>;
}

impl ToolLookup for AnyToolBox {
    fn find_tool(&self, name: &str) -> Option<Arc<dyn AnyTool>> {
        self.iter().find(|tool| tool.name() == name).cloned()
    }
}
