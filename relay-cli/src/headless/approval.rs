use std::io::{self, Write};
use async_trait::async_trait;
use console::style;
use relay_core::backend::{ApprovalDecision, ApprovalRequest};
use relay_core::roundtrip::{ApprovalError, ApprovalHandler};

pub const APPROVAL_PROMPT: &str = "approve? [y/N]";

/// Asks on the terminal before a protocol server call goes through
pub struct ConsoleApprover;

impl ConsoleApprover {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ApprovalHandler for ConsoleApprover {
    async fn decide(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, ApprovalError> {
        // the event output already printed the call itself
        let question = format!("  {} ", style(APPROVAL_PROMPT).yellow());

        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            eprint!("{}", question);
            io::stderr().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| ApprovalError::Handler(e.to_string()))?
        .map_err(|e| ApprovalError::Handler(format!("cannot read the answer: {}", e)))?;

        if parse_answer(&answer) {
            Ok(ApprovalDecision::approve(&request.id))
        } else {
            Ok(ApprovalDecision::deny(&request.id, Some("denied on the console".to_string())))
        }
    }
}

/// Only an explicit yes approves
pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
