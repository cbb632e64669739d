//! Model endpoints of the relay: chat completions through openai_dive,
//! the Responses API, files and vector stores over reqwest, and the tool
//! declaration helpers shared by both dialects.

pub mod client;
pub mod files;
pub mod provider;
pub mod providers;
pub mod responses;
pub mod tool;

pub use client::{LlmClient, ProviderKind};
pub use files::FileError;
pub use provider::{EnvVar, LlmError, LlmProvider, LlmStream, ProviderInfo};
pub use responses::ResponsesClient;

pub use tool::{
    ToolDescription,
    ToolBox,
    ContainsTool,
    FunctionCallingBuilder,
    StructuredReply,
};

// Re-export commonly used openai_dive types for consumers
pub use openai_dive::v1::error::APIError;
pub use openai_dive::v1::resources::chat::{
    ChatCompletionParameters,
    ChatCompletionParametersBuilder,
    ChatCompletionResponse,
    ChatCompletionChunkResponse,
    ChatMessage,
    ChatMessageContent,
    ChatCompletionTool,
    ChatCompletionToolType,
    ChatCompletionFunction,
    DeltaChatMessage,
    ToolCall,
    Function,
    ChatCompletionChoice,
};
