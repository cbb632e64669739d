use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use serde_json::Value;
use relay_llm::responses::{HostedTool, McpApproval};

use crate::tools::AnyTool;

/// Where a declared tool runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// executed by the caller
    LocalFunction,
    /// executed by the provider (web search, file search, image generation)
    HostedRemote,
    /// executed by a third party MCP server, invoked by the provider
    ProtocolServer,
}

/// A remote MCP server the provider may call on the caller's behalf
#[derive(Debug, Clone, PartialEq)]
pub struct McpServer {
    pub label: String,
    pub url: String,
    pub allowed_tools: Option<Vec<String>>,
    pub require_approval: McpApproval,
    pub headers: HashMap<String, String>,
}

impl McpServer {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            allowed_tools: None,
            require_approval: McpApproval::Always,
            headers: HashMap::new(),
        }
    }

    pub fn allow(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    pub fn require_approval(mut self, approval: McpApproval) -> Self {
        self.require_approval = approval;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn to_hosted(&self) -> HostedTool {
        HostedTool::Mcp {
            server_label: self.label.clone(),
            server_url: self.url.clone(),
            allowed_tools: self.allowed_tools.clone(),
            require_approval: Some(self.require_approval),
            headers: if self.headers.is_empty() { None } else { Some(self.headers.clone()) },
        }
    }
}

/// A tool offered to the model for one request
#[derive(Clone)]
pub enum ToolDeclaration {
    Local(Arc<dyn AnyTool>),
    Hosted(HostedTool),
    ProtocolServer(McpServer),
}

impl ToolDeclaration {
    pub fn local<T: AnyTool + 'static>(tool: T) -> Self {
        ToolDeclaration::Local(Arc::new(tool))
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            ToolDeclaration::Local(_) => ExecutionMode::LocalFunction,
            ToolDeclaration::Hosted(_) => ExecutionMode::HostedRemote,
            ToolDeclaration::ProtocolServer(_) => ExecutionMode::ProtocolServer,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ToolDeclaration::Local(tool) => tool.name().to_string(),
            ToolDeclaration::Hosted(HostedTool::Function { name, .. }) => name.clone(),
            ToolDeclaration::Hosted(hosted) => hosted.type_name().to_string(),
            ToolDeclaration::ProtocolServer(server) => server.label.clone(),
        }
    }

    pub fn description(&self) -> Option<String> {
        match self {
            ToolDeclaration::Local(tool) => Some(tool.description().to_string()),
            ToolDeclaration::Hosted(HostedTool::Function { description, .. }) => description.clone(),
            _ => None,
        }
    }

    /// Schema of the arguments, known only for functions
    pub fn input_schema(&self) -> Option<Value> {
        match self {
            ToolDeclaration::Local(tool) => Some(tool.parameters_schema()),
            ToolDeclaration::Hosted(HostedTool::Function { parameters, .. }) => Some(parameters.clone()),
            _ => None,
        }
    }

    pub fn to_hosted(&self) -> HostedTool {
        match self {
            ToolDeclaration::Local(tool) => tool.to_function_tool(),
            ToolDeclaration::Hosted(hosted) => hosted.clone(),
            ToolDeclaration::ProtocolServer(server) => server.to_hosted(),
        }
    }

    pub fn as_local(&self) -> Option<&Arc<dyn AnyTool>> {
        match self {
            ToolDeclaration::Local(tool) => Some(tool),
            _ => None,
        }
    }
}

impl fmt::Debug for ToolDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolDeclaration::Local(tool) => write!(f, "Local({})", tool.name()),
            ToolDeclaration::Hosted(hosted) => write!(f, "Hosted({})", hosted.type_name()),
            ToolDeclaration::ProtocolServer(server) => write!(f, "ProtocolServer({})", server.label),
        }
    }
}

impl From<Arc<dyn AnyTool>> for ToolDeclaration {
    fn from(tool: Arc<dyn AnyTool>) -> Self {
        ToolDeclaration::Local(tool)
    }
}

impl From<HostedTool> for ToolDeclaration {
    fn from(tool: HostedTool) -> Self {
        ToolDeclaration::Hosted(tool)
    }
}

impl From<McpServer> for ToolDeclaration {
    fn from(server: McpServer) -> Self {
        ToolDeclaration::ProtocolServer(server)
    }
}
