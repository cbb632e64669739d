use relay_llm::LlmError;

use crate::backend::{ModelReply, StreamEvent};

/// Folds stream events, in arrival order, into the final reply
///
/// Content and argument deltas are concatenated as they come; nothing is
/// assumed about where a delta starts or ends.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    refusal: String,
    arguments: Vec<(String, String)>,
    completed: Option<ModelReply>,
    error: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::ContentDelta(delta) => self.text.push_str(&delta),
            StreamEvent::RefusalDelta(delta) => self.refusal.push_str(&delta),
            StreamEvent::ToolArgumentsDelta { item_id, delta } => {
                match self.arguments.iter_mut().find(|(id, _)| *id == item_id) {
                    Some((_, arguments)) => arguments.push_str(&delta),
                    None => self.arguments.push((item_id, delta)),
                }
            }
            StreamEvent::Completed(reply) => self.completed = Some(reply),
            StreamEvent::Error(message) => self.error = Some(message),
        }
    }

    /// Text received so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Arguments received so far for a function call item
    pub fn arguments(&self, item_id: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(id, _)| id == item_id)
            .map(|(_, arguments)| arguments.as_str())
    }

    pub fn is_completed(&self) -> bool {
        self.completed.is_some() || self.error.is_some()
    }

    /// The completed reply, its text falling back to the concatenated deltas
    pub fn finish(self) -> Result<ModelReply, LlmError> {
        if let Some(message) = self.error {
            return Err(message.into());
        }

        let Some(mut reply) = self.completed else {
            return Err("stream ended before the response completed".into());
        };
        if reply.text.is_empty() {
            reply.text = self.text;
        }
        if reply.refusal.is_none() && !self.refusal.is_empty() {
            reply.refusal = Some(self.refusal);
        }
        Ok(reply)
    }
}
