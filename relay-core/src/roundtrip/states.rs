use std::fmt;

/// Where a round trip stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTripState {
    /// a request has been submitted
    AwaitingModel,
    /// the reply is being inspected
    ModelResponded,
    /// local invocations are being executed
    Executing,
    /// protocol server calls wait for the caller's consent
    AwaitingApproval,
    /// a terminal outcome has been reached
    Done,
}

impl RoundTripState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundTripState::Done)
    }
}

impl fmt::Display for RoundTripState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundTripState::AwaitingModel => "awaiting_model",
            RoundTripState::ModelResponded => "model_responded",
            RoundTripState::Executing => "executing",
            RoundTripState::AwaitingApproval => "awaiting_approval",
            RoundTripState::Done => "done",
        };
        f.write_str(name)
    }
}
