use thiserror::Error;
use relay_llm::LlmError;
use relay_llm::tool::SchemaError;

use crate::conversation::ConversationError;
use super::approval::ApprovalError;

#[derive(Error, Debug)]
pub enum RoundTripError {
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("structured output does not match the schema: {0}")]
    SchemaViolation(#[from] SchemaError),
    #[error("Maximum number of submissions reached ({0})")]
    MaxRoundsReached(usize),
    #[error("round trip cancelled")]
    Cancelled,
    #[error("approval requested but the reply carries no response id to chain on")]
    MissingResponseId,
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),
    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<LlmError> for RoundTripError {
    fn from(error: LlmError) -> Self {
        RoundTripError::Llm(error.to_string())
    }
}
