pub mod conversation;


pub use conversation::{Conversation, ConversationError, Message, ToolInvocation};
