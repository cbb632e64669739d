use std::collections::HashMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchContextSize {
    Low,
    Medium,
    High,
}

/// Approximate location used to refine web search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl UserLocation {
    pub fn approximate() -> Self {
        Self { kind: "approximate".to_string(), ..Default::default() }
    }
}

/// Whether the host must ask the caller before sending data to an MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpApproval {
    Never,
    Always,
}

/// Tool declaration as understood by the Responses API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostedTool {
    Function {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        parameters: Value,
        strict: bool,
    },
    #[serde(rename = "web_search_preview")]
    WebSearch {
        #[serde(skip_serializing_if = "Option::is_none")]
        user_location: Option<UserLocation>,
        #[serde(skip_serializing_if = "Option::is_none")]
        search_context_size: Option<SearchContextSize>,
    },
    FileSearch {
        vector_store_ids: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_num_results: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filters: Option<Value>,
    },
    Mcp {
        server_label: String,
        server_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        allowed_tools: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        require_approval: Option<McpApproval>,
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
    ImageGeneration {
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        quality: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        background: Option<String>,
    },
}

impl HostedTool {
    pub fn web_search() -> Self {
        HostedTool::WebSearch { user_location: None, search_context_size: None }
    }

    pub fn file_search(vector_store_ids: Vec<String>) -> Self {
        HostedTool::FileSearch { vector_store_ids, max_num_results: None, filters: None }
    }

    pub fn image_generation() -> Self {
        HostedTool::ImageGeneration { size: None, quality: None, background: None }
    }

    /// Value of the `type` field, used by forced tool choices
    pub fn type_name(&self) -> &'static str {
        match self {
            HostedTool::Function { .. } => "function",
            HostedTool::WebSearch { .. } => "web_search_preview",
            HostedTool::FileSearch { .. } => "file_search",
            HostedTool::Mcp { .. } => "mcp",
            HostedTool::ImageGeneration { .. } => "image_generation",
        }
    }
}

/// Tool selection policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// the model decides
    #[default]
    Auto,
    /// no tool may be called
    None,
    /// at least one tool must be called
    Required,
    /// the named function must be called
    Function(String),
    /// the hosted tool of this type must be used (e.g. `web_search_preview`)
    Hosted(String),
}

/// Wire representation, which differs from the config representation above
pub struct WireToolChoice<'a>(pub &'a ToolChoice);

impl Serialize for WireToolChoice<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            ToolChoice::Auto => serializer.serialize_str("auto"),
            ToolChoice::None => serializer.serialize_str("none"),
            ToolChoice::Required => serializer.serialize_str("required"),
            ToolChoice::Function(name) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "function")?;
                map.serialize_entry("name", name)?;
                map.end()
            }
            ToolChoice::Hosted(kind) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", kind)?;
                map.end()
            }
        }
    }
}

pub(crate) fn serialize_tool_choice<S: Serializer>(
    choice: &Option<ToolChoice>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match choice {
        Some(choice) => WireToolChoice(choice).serialize(serializer),
        None => serializer.serialize_none(),
    }
}
