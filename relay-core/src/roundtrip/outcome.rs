use serde::de::DeserializeOwned;
use serde_json::Value;
use relay_llm::responses::IncompleteReason;
use relay_llm::StructuredReply;

use crate::backend::{ApprovalRequest, RemoteCall};

/// Terminal outcome of a round trip
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// final plain text answer
    Done { text: String },
    /// final answer validated against the requested schema
    Structured { value: Value, text: String },
    /// the model declined
    Refusal { reason: String },
    /// the reply was truncated, the partial output is kept
    Incomplete { reason: IncompleteReason, partial: String },
    /// the caller denied protocol server calls and asked to stop
    Denied { requests: Vec<ApprovalRequest> },
}

impl Outcome {
    /// Text carried by the outcome, partial text included
    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Done { text } | Outcome::Structured { text, .. } => Some(text),
            Outcome::Incomplete { partial, .. } => Some(partial),
            Outcome::Refusal { .. } | Outcome::Denied { .. } => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done { .. } | Outcome::Structured { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundTripResult {
    pub outcome: Outcome,
    /// id of the last response, to chain a later exchange on it
    pub response_id: Option<String>,
    pub submissions: usize,
    pub images: Vec<String>,
    pub remote_calls: Vec<RemoteCall>,
}

impl RoundTripResult {
    pub fn text(&self) -> Option<&str> {
        self.outcome.text()
    }

    /// Decode a structured outcome into `T`, a refusal is a valid answer
    pub fn structured<T: DeserializeOwned>(&self) -> Option<Result<StructuredReply<T>, serde_json::Error>> {
        match &self.outcome {
            Outcome::Structured { value, .. } => Some(StructuredReply::from_value(value.clone())),
            Outcome::Refusal { reason } => Some(Ok(StructuredReply::Refusal(reason.clone()))),
            _ => None,
        }
    }
}
