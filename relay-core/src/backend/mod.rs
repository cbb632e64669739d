pub mod types;
pub mod responses;
pub mod chat;


use async_trait::async_trait;
use relay_llm::LlmError;

pub use types::{
    ApprovalDecision, ApprovalRequest, ContinuationItem, ModelReply, ModelRequest, OutputSchema,
    RemoteCall, ReplyStatus, ReplyStream, RequestInput, StreamEvent,
};
pub use responses::ResponsesBackend;
pub use chat::ChatBackend;

/// A model serving endpoint the round trip submits to
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether replies carry a response id usable for chained submissions
    fn supports_chaining(&self) -> bool;

    async fn submit(&self, request: &ModelRequest) -> Result<ModelReply, LlmError>;

    async fn submit_stream(&self, request: &ModelRequest) -> Result<ReplyStream, LlmError>;
}
