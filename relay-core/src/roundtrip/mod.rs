pub mod approval;
pub mod builder;
pub mod declaration;
pub mod error;
pub mod events;
pub mod outcome;
pub mod output;
pub mod roundtrip;
pub mod states;
pub mod stream;

#[cfg(test)]
mod tests;

pub use approval::{
    closure_approver, ApprovalError, ApprovalHandler, ClosureApprover, ConsentRule, ConsentRules,
    DenyAll, ANY_TOOL,
};
pub use builder::RoundTripBuilder;
pub use declaration::{ExecutionMode, McpServer, ToolDeclaration};
pub use error::RoundTripError;
pub use events::{closure_handler, ClosureHandler, DynEventHandler, RoundTripEvent, RoundTripEventHandler};
pub use outcome::{Outcome, RoundTripResult};
pub use output::{FileEventLogger, PrettyFormatter, StdoutEventManager};
pub use roundtrip::{DenialPolicy, HistoryMode, RoundTrip, DEFAULT_MAX_ROUNDS, DENIED_MESSAGE};
pub use states::RoundTripState;
pub use stream::StreamAccumulator;
