use async_trait::async_trait;

use crate::backend::{ApprovalDecision, ApprovalRequest};

/// Matches every tool of a server
pub const ANY_TOOL: &str = "*";

/// A standing consent decision for the tools of a protocol server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRule {
    pub server_label: String,
    /// `*` for every tool of the server
    pub tool_name: String,
    pub approve: bool,
    /// sent back to the model as the denial reason
    pub description: Option<String>,
}

impl ConsentRule {
    /// Approve every call of a tool, whatever its arguments
    pub fn allow(server_label: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self { server_label: server_label.into(), tool_name: tool_name.into(), approve: true, description: None }
    }

    /// Deny every call of a tool, whatever its arguments
    pub fn deny(server_label: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self { approve: false, ..Self::allow(server_label, tool_name) }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        self.server_label == request.server_label && (self.tool_name == ANY_TOOL || self.tool_name == request.tool_name)
    }
}

/// Consent rules checked before any handler is asked
#[derive(Debug, Clone, Default)]
pub struct ConsentRules {
    rules: Vec<ConsentRule>,
    approve_all: bool,
}

impl ConsentRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approve every request no rule decides
    pub fn approve_all(mut self) -> Self {
        self.approve_all = true;
        self
    }

    pub fn is_approve_all(&self) -> bool {
        self.approve_all
    }

    pub fn add_rule(&mut self, rule: ConsentRule) {
        self.rules.push(rule);
    }

    pub fn rule(mut self, rule: ConsentRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Decision of the first matching rule, `None` when nothing matches
    /// and approve_all is off
    pub fn decide(&self, request: &ApprovalRequest) -> Option<ApprovalDecision> {
        match self.rules.iter().find(|rule| rule.matches(request)) {
            Some(rule) if rule.approve => Some(ApprovalDecision::approve(&request.id)),
            Some(rule) => Some(ApprovalDecision::deny(&request.id, rule.description.clone())),
            None if self.approve_all => Some(ApprovalDecision::approve(&request.id)),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[ConsentRule] {
        &self.rules
    }
}

/// Decides approval requests no consent rule covers
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn decide(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, ApprovalError>;
}

/// Denies everything, the default when no handler is configured
pub struct DenyAll;

#[async_trait]
impl ApprovalHandler for DenyAll {
    async fn decide(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, ApprovalError> {
        Ok(ApprovalDecision::deny(&request.id, Some("no approval handler configured".to_string())))
    }
}

pub struct ClosureApprover<F> {
    f: F,
}

#[async_trait]
impl<F> ApprovalHandler for ClosureApprover<F>
where
    F: Fn(&ApprovalRequest) -> bool + Send + Sync,
{
    async fn decide(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, ApprovalError> {
        if (self.f)(request) {
            Ok(ApprovalDecision::approve(&request.id))
        } else {
            Ok(ApprovalDecision::deny(&request.id, None))
        }
    }
}

pub fn closure_approver<F>(f: F) -> ClosureApprover<F>
where
    F: Fn(&ApprovalRequest) -> bool + Send + Sync,
{
    ClosureApprover { f }
}

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval handler failed: {0}")]
    Handler(String),
}
