pub mod client;
pub mod stream;
pub mod tools;
pub mod types;


pub use client::{ResponsesClient, DEFAULT_BASE_URL};
pub use stream::{ResponseEventStream, ResponseStreamEvent};
pub use tools::{HostedTool, McpApproval, SearchContextSize, ToolChoice, UserLocation};
pub use types::{
    error_message, FileSearchResult, IncompleteDetails, IncompleteReason, InputItem, McpCallView,
    McpToolInfo, OutputContent, OutputItem, ReasoningConfig, ReasoningEffort, Response,
    ResponseError, ResponseInput, ResponseRequest, ResponseStatus, ResponseUsage, Role, TextConfig,
    TextFormat,
};
