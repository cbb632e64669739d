pub mod backend;
pub mod config;
pub mod conversation;
pub mod logging;
pub mod roundtrip;
pub mod tools;

pub use backend::{ChatBackend, ModelBackend, ResponsesBackend};
pub use conversation::{Conversation, Message, ToolInvocation};
pub use roundtrip::{Outcome, RoundTrip, RoundTripBuilder, RoundTripError, RoundTripResult};
