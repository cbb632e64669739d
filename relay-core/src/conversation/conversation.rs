use std::collections::HashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A tool invocation produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// raw JSON text, exactly as produced by the model
    pub arguments: String,
    /// set when the invocation was executed by a protocol server on the host side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_label: Option<String>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            server_label: None,
        }
    }

    pub fn remote(
        id: impl Into<String>,
        server_label: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            server_label: Some(server_label.into()),
            ..Self::new(id, name, arguments)
        }
    }

    pub fn is_remote(&self) -> bool {
        self.server_label.is_some()
    }

    /// Arguments as JSON, an empty string being an empty object
    pub fn parsed_arguments(&self) -> Result<Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    Developer {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        invocations: Vec<ToolInvocation>,
    },
    Tool {
        invocation_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn developer(content: impl Into<String>) -> Self {
        Message::Developer { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant { content: Some(content.into()), invocations: vec![] }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::Developer { .. } => "developer",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    /// Text content, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content }
            | Message::Developer { content }
            | Message::User { content }
            | Message::Tool { content, .. } => Some(content),
            Message::Assistant { content, .. } => content.as_deref(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("tool message references unknown invocation '{0}'")]
    UnknownInvocation(String),
    #[error("invocation '{0}' has already been answered")]
    AlreadyAnswered(String),
    #[error("invocation id '{0}' is used twice")]
    DuplicateInvocation(String),
}

/// Ordered list of messages owned by the caller
///
/// Every tool message answers exactly one invocation carried by an earlier
/// assistant message; pushing a message that breaks this is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct Conversation {
    messages: Vec<Message>,
    invocations: HashSet<String>,
    answered: HashSet<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Result<Self, ConversationError> {
        let mut conversation = Self::new();
        for message in messages {
            conversation.push(message)?;
        }
        Ok(conversation)
    }

    pub fn system(&mut self, content: impl Into<String>) -> &mut Self {
        self.messages.push(Message::system(content));
        self
    }

    pub fn developer(&mut self, content: impl Into<String>) -> &mut Self {
        self.messages.push(Message::developer(content));
        self
    }

    pub fn user(&mut self, content: impl Into<String>) -> &mut Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn push(&mut self, message: Message) -> Result<(), ConversationError> {
        match &message {
            Message::Assistant { invocations, .. } => {
                let mut seen = HashSet::new();
                for invocation in invocations {
                    if self.invocations.contains(&invocation.id) || !seen.insert(invocation.id.as_str()) {
                        return Err(ConversationError::DuplicateInvocation(invocation.id.clone()));
                    }
                }
                self.invocations.extend(invocations.iter().map(|i| i.id.clone()));
            }
            Message::Tool { invocation_id, .. } => {
                if !self.invocations.contains(invocation_id) {
                    return Err(ConversationError::UnknownInvocation(invocation_id.clone()));
                }
                if !self.answered.insert(invocation_id.clone()) {
                    return Err(ConversationError::AlreadyAnswered(invocation_id.clone()));
                }
            }
            _ => {}
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn push_assistant(
        &mut self,
        content: Option<String>,
        invocations: Vec<ToolInvocation>,
    ) -> Result<(), ConversationError> {
        self.push(Message::Assistant { content, invocations })
    }

    pub fn push_tool_result(
        &mut self,
        invocation_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Result<(), ConversationError> {
        self.push(Message::Tool {
            invocation_id: invocation_id.into(),
            content: content.into(),
            is_error,
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Invocation with this id, if any assistant message carries it
    pub fn invocation(&self, id: &str) -> Option<&ToolInvocation> {
        self.messages.iter().find_map(|message| match message {
            Message::Assistant { invocations, .. } => invocations.iter().find(|i| i.id == id),
            _ => None,
        })
    }

    /// Invocations that no tool message answers yet
    pub fn pending_invocations(&self) -> Vec<&ToolInvocation> {
        self.messages
            .iter()
            .filter_map(|message| match message {
                Message::Assistant { invocations, .. } => Some(invocations),
                _ => None,
            })
            .flatten()
            .filter(|invocation| !self.answered.contains(&invocation.id))
            .collect()
    }

    /// Messages added after the last assistant or tool message
    ///
    /// This is what a chained submission has to send, the provider already
    /// knows everything before it.
    pub fn unsent_tail(&self) -> &[Message] {
        let start = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. } | Message::Tool { .. }))
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.messages[start..]
    }

    /// Text of the last assistant message
    pub fn last_answer(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|message| match message {
            Message::Assistant { content: Some(content), .. } => Some(content.as_str()),
            _ => None,
        })
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl TryFrom<Vec<Message>> for Conversation {
    type Error = ConversationError;

    fn try_from(messages: Vec<Message>) -> Result<Self, Self::Error> {
        Self::from_messages(messages)
    }
}

impl From<Conversation> for Vec<Message> {
    fn from(conversation: Conversation) -> Self {
        conversation.messages
    }
}
