use std::pin::Pin;
use futures::Stream;
use openai_dive::v1::error::APIError;
use serde::{Deserialize, Serialize};

use super::types::{OutputItem, Response};

/// Server-sent event emitted by `POST /responses` with `stream: true`
///
/// Only the events the round trip reacts to are modelled, everything else
/// deserializes to `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseStreamEvent {
    #[serde(rename = "response.created")]
    Created { response: Response },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { output_index: u32, item: OutputItem },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone { output_index: u32, item: OutputItem },

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        delta: String,
    },

    #[serde(rename = "response.output_text.done")]
    OutputTextDone { item_id: String, text: String },

    #[serde(rename = "response.refusal.delta")]
    RefusalDelta { item_id: String, delta: String },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        output_index: u32,
        delta: String,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone { item_id: String, arguments: String },

    #[serde(rename = "response.completed")]
    Completed { response: Response },

    #[serde(rename = "response.incomplete")]
    Incomplete { response: Response },

    #[serde(rename = "response.failed")]
    Failed { response: Response },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<String>,
        message: String,
    },

    #[serde(other)]
    Other,
}

impl ResponseStreamEvent {
    /// The final response carried by a terminal event
    pub fn final_response(&self) -> Option<&Response> {
        match self {
            ResponseStreamEvent::Completed { response }
            | ResponseStreamEvent::Incomplete { response }
            | ResponseStreamEvent::Failed { response } => Some(response),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.final_response().is_some() || matches!(self, ResponseStreamEvent::Error { .. })
    }
}

pub type ResponseEventStream =
    Pin<Box<dyn Stream<Item = Result<ResponseStreamEvent, APIError>> + Send>>;
