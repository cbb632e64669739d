use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;

use crate::backend::{ApprovalDecision, ApprovalRequest, RemoteCall};
use crate::conversation::ToolInvocation;
use crate::tools::ToolFailure;
use super::outcome::Outcome;
use super::states::RoundTripState;

/// Observable progress of a round trip
#[derive(Debug, Clone)]
pub enum RoundTripEvent {
    Submitted {
        round: usize,
        chained: bool,
    },
    Responded {
        round: usize,
        response_id: Option<String>,
        invocations: usize,
        approval_requests: usize,
    },
    ToolStarted {
        invocation: ToolInvocation,
    },
    ToolCompleted {
        invocation: ToolInvocation,
        result: Result<String, ToolFailure>,
        duration: Duration,
    },
    ApprovalRequested {
        request: ApprovalRequest,
    },
    ApprovalResolved {
        request: ApprovalRequest,
        decision: ApprovalDecision,
    },
    RemoteToolCompleted {
        call: RemoteCall,
    },
    ContentDelta {
        delta: String,
    },
    StateChanged {
        from: RoundTripState,
        to: RoundTripState,
    },
    Finished {
        outcome: Outcome,
    },
}

#[async_trait]
pub trait RoundTripEventHandler: Send + Sync {
    async fn handle_event(&self, event: RoundTripEvent);
}

pub type DynEventHandler = Arc<dyn RoundTripEventHandler>;

pub struct ClosureHandler<F> {
    f: F,
}

#[async_trait]
impl<F> RoundTripEventHandler for ClosureHandler<F>
where
    F: Fn(RoundTripEvent) + Send + Sync,
{
    async fn handle_event(&self, event: RoundTripEvent) {
        (self.f)(event)
    }
}

pub fn closure_handler<F>(f: F) -> ClosureHandler<F>
where
    F: Fn(RoundTripEvent) + Send + Sync,
{
    ClosureHandler { f }
}
