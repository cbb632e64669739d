use std::sync::Arc;
use schemars::JsonSchema;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use relay_llm::responses::{ReasoningEffort, ToolChoice};

use crate::backend::{ModelBackend, OutputSchema};
use crate::tools::{AnyTool, AnyToolBox, ToolCapability};
use super::approval::{ApprovalHandler, ConsentRules, DenyAll};
use super::declaration::ToolDeclaration;
use super::events::{DynEventHandler, RoundTripEventHandler};
use super::roundtrip::{DenialPolicy, HistoryMode, RoundTrip, DEFAULT_MAX_ROUNDS};

/// Builder for RoundTrip
pub struct RoundTripBuilder {
    pub session_id: String,
    pub backend: Arc<dyn ModelBackend>,
    pub model: String,
    pub instructions: Option<String>,
    pub declarations: Vec<ToolDeclaration>,
    pub tool_choice: ToolChoice,
    pub max_rounds: usize,
    pub history: HistoryMode,
    pub denial: DenialPolicy,
    pub consent: ConsentRules,
    pub approvals: Arc<dyn ApprovalHandler>,
    /// None grants every capability
    pub granted: Option<Vec<ToolCapability>>,
    pub max_output_tokens: Option<u32>,
    pub output_schema: Option<OutputSchema>,
    pub reasoning: Option<ReasoningEffort>,
    pub include: Vec<String>,
    pub temperature: Option<f32>,
    pub previous_response_id: Option<String>,
    pub streaming: bool,
    pub handlers: Vec<DynEventHandler>,
    pub cancellation: CancellationToken,
}

impl RoundTripBuilder {
    pub fn new(backend: Arc<dyn ModelBackend>, model: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            backend,
            model: model.into(),
            instructions: None,
            declarations: vec![],
            tool_choice: ToolChoice::Auto,
            max_rounds: DEFAULT_MAX_ROUNDS,
            history: HistoryMode::default(),
            denial: DenialPolicy::default(),
            consent: ConsentRules::new(),
            approvals: Arc::new(DenyAll),
            granted: None,
            max_output_tokens: None,
            output_schema: None,
            reasoning: None,
            include: vec![],
            temperature: None,
            previous_response_id: None,
            streaming: false,
            handlers: vec![],
            cancellation: CancellationToken::new(),
        }
    }
}

impl RoundTripBuilder {
    pub fn id(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }

    pub fn instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    pub fn tool(mut self, declaration: impl Into<ToolDeclaration>) -> Self {
        self.declarations.push(declaration.into());
        self
    }

    pub fn local_tool<T: AnyTool + 'static>(mut self, tool: T) -> Self {
        self.declarations.push(ToolDeclaration::local(tool));
        self
    }

    pub fn tools(mut self, tools: AnyToolBox) -> Self {
        self.declarations.extend(tools.into_iter().map(ToolDeclaration::Local));
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn history(mut self, history: HistoryMode) -> Self {
        self.history = history;
        self
    }

    pub fn denial_policy(mut self, denial: DenialPolicy) -> Self {
        self.denial = denial;
        self
    }

    pub fn consent(mut self, consent: ConsentRules) -> Self {
        self.consent = consent;
        self
    }

    pub fn approval_handler(mut self, handler: impl ApprovalHandler + 'static) -> Self {
        self.approvals = Arc::new(handler);
        self
    }

    /// Approve every protocol server call without asking
    pub fn approve_all(mut self) -> Self {
        self.consent = self.consent.approve_all();
        self
    }

    /// Only run local tools whose capabilities are all in `capabilities`
    pub fn capabilities(mut self, capabilities: impl IntoIterator<Item = ToolCapability>) -> Self {
        self.granted = Some(capabilities.into_iter().collect());
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Constrain the final answer to the strict schema of `T`
    pub fn structured<T: JsonSchema>(self, name: &str) -> Self {
        self.output_schema(OutputSchema::of::<T>(name))
    }

    pub fn reasoning(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning = Some(effort);
        self
    }

    pub fn include(mut self, field: &str) -> Self {
        self.include.push(field.to_string());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Chain the first submission on an earlier exchange
    pub fn previous_response_id(mut self, id: &str) -> Self {
        self.previous_response_id = Some(id.to_string());
        self
    }

    pub fn streaming(mut self, enable: bool) -> Self {
        self.streaming = enable;
        self
    }

    pub fn event_handler(mut self, handler: impl RoundTripEventHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn build(self) -> RoundTrip {
        RoundTrip {
            session_id: self.session_id,
            backend: self.backend,
            model: self.model,
            instructions: self.instructions,
            declarations: self.declarations,
            tool_choice: self.tool_choice,
            max_rounds: self.max_rounds,
            history: self.history,
            denial: self.denial,
            consent: self.consent,
            approvals: self.approvals,
            granted: self.granted,
            max_output_tokens: self.max_output_tokens,
            output_schema: self.output_schema,
            reasoning: self.reasoning,
            include: self.include,
            temperature: self.temperature,
            previous_response_id: self.previous_response_id,
            streaming: self.streaming,
            handlers: self.handlers,
            cancellation: self.cancellation,
        }
    }
}
