use std::sync::Arc;
use std::time::Instant;
use futures::future::join_all;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use relay_llm::responses::{ReasoningEffort, ToolChoice};
use relay_llm::tool::{refusal_flag, validate, SchemaError};

use crate::backend::{
    ApprovalDecision, ApprovalRequest, ContinuationItem, ModelBackend, ModelReply, ModelRequest,
    OutputSchema, RemoteCall, ReplyStatus, RequestInput, StreamEvent,
};
use crate::conversation::{Conversation, Message, ToolInvocation};
use crate::tools::{AnyTool, ToolCapability, ToolFailure, ToolResult};
use super::approval::{ApprovalHandler, ConsentRules};
use super::declaration::ToolDeclaration;
use super::error::RoundTripError;
use super::events::{closure_handler, DynEventHandler, RoundTripEvent, RoundTripEventHandler};
use super::outcome::{Outcome, RoundTripResult};
use super::states::RoundTripState;
use super::stream::StreamAccumulator;

pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// Content of the tool message recording a denied protocol server call
pub const DENIED_MESSAGE: &str = "denied by caller";

/// What is sent after the first submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// the whole conversation, every time
    #[default]
    Resend,
    /// only the new tool outputs, chained on the previous response id
    Chain,
}

/// What happens when the caller denies a protocol server call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialPolicy {
    /// transmit `approve: false` and let the model react
    #[default]
    InformModel,
    /// end the round trip with `Outcome::Denied`, nothing is transmitted
    Stop,
}

/// Drives a request through tool satisfaction cycles until a terminal outcome
pub struct RoundTrip {
    pub(crate) session_id: String,
    pub(crate) backend: Arc<dyn ModelBackend>,
    pub(crate) model: String,
    pub(crate) instructions: Option<String>,
    pub(crate) declarations: Vec<ToolDeclaration>,
    pub(crate) tool_choice: ToolChoice,
    pub(crate) max_rounds: usize,
    pub(crate) history: HistoryMode,
    pub(crate) denial: DenialPolicy,
    pub(crate) consent: ConsentRules,
    pub(crate) approvals: Arc<dyn ApprovalHandler>,
    pub(crate) granted: Option<Vec<ToolCapability>>,
    pub(crate) max_output_tokens: Option<u32>,
    pub(crate) output_schema: Option<OutputSchema>,
    pub(crate) reasoning: Option<ReasoningEffort>,
    pub(crate) include: Vec<String>,
    pub(crate) temperature: Option<f32>,
    pub(crate) previous_response_id: Option<String>,
    pub(crate) streaming: bool,
    pub(crate) handlers: Vec<DynEventHandler>,
    pub(crate) cancellation: CancellationToken,
}

impl RoundTrip {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    /// Token cancelling the round trip at its next suspension point
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn with_event_handler(mut self, handler: impl RoundTripEventHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn on_event<F>(self, f: F) -> Self
    where
        F: Fn(RoundTripEvent) + Send + Sync + 'static,
    {
        self.with_event_handler(closure_handler(f))
    }

    /// Run on a fresh conversation holding a single user prompt
    pub async fn ask(&self, prompt: &str) -> Result<(RoundTripResult, Conversation), RoundTripError> {
        let mut conversation = Conversation::new();
        conversation.user(prompt);
        let result = self.run(&mut conversation).await?;
        Ok((result, conversation))
    }

    /// Run the round trip, appending every assistant and tool message to `conversation`
    pub async fn run(&self, conversation: &mut Conversation) -> Result<RoundTripResult, RoundTripError> {
        let mut state = RoundTripState::AwaitingModel;
        let mut previous = self.previous_response_id.clone();
        // once chained on a provider reference, resending would lose what only the provider holds
        let mut force_chain = previous.is_some();
        let mut pending: Vec<ContinuationItem> = match previous {
            Some(_) => conversation.unsent_tail().iter().cloned().map(ContinuationItem::Message).collect(),
            None => vec![],
        };
        let mut tool_choice = self.tool_choice.clone();
        let mut submissions = 0;
        let mut response_id = None;
        let mut images = Vec::new();
        let mut remote_calls = Vec::new();

        let outcome = loop {
            if submissions >= self.max_rounds {
                warn!(target: "roundtrip::status", session = %self.session_id, "maximum of {} submissions reached", self.max_rounds);
                return Err(RoundTripError::MaxRoundsReached(self.max_rounds));
            }
            if self.cancellation.is_cancelled() {
                return Err(RoundTripError::Cancelled);
            }

            let input = match &previous {
                Some(id) => RequestInput::Continuation {
                    previous_response_id: id.clone(),
                    items: std::mem::take(&mut pending),
                },
                None => RequestInput::Conversation(conversation.clone()),
            };
            pending.clear();
            let chained = previous.is_some();
            submissions += 1;

            self.transition(&mut state, RoundTripState::AwaitingModel).await;
            info!(target: "roundtrip::submit", session = %self.session_id, round = submissions, chained, "submitting to {}", self.backend.name());
            self.emit(RoundTripEvent::Submitted { round: submissions, chained }).await;

            let request = self.request(input, &tool_choice);
            let reply = self.submit(&request).await?;
            response_id = reply.response_id.clone().or(response_id);

            self.transition(&mut state, RoundTripState::ModelResponded).await;
            debug!(
                target: "roundtrip::submit",
                "reply {:?}: {} invocation(s), {} approval request(s), {} remote call(s)",
                reply.response_id,
                reply.invocations.len(),
                reply.approval_requests.len(),
                reply.remote_calls.len()
            );
            self.emit(RoundTripEvent::Responded {
                round: submissions,
                response_id: reply.response_id.clone(),
                invocations: reply.invocations.len(),
                approval_requests: reply.approval_requests.len(),
            })
            .await;

            images.extend(reply.images.iter().cloned());
            self.record_remote_calls(conversation, &reply.remote_calls).await?;
            remote_calls.extend(reply.remote_calls.iter().cloned());

            if let ReplyStatus::Incomplete(reason) = &reply.status {
                if !reply.text.is_empty() {
                    conversation.push_assistant(Some(reply.text.clone()), vec![])?;
                }
                break Outcome::Incomplete { reason: reason.clone(), partial: reply.text };
            }

            if let Some(reason) = reply.refusal {
                break Outcome::Refusal { reason };
            }

            let mut progressed = false;

            if !reply.approval_requests.is_empty() {
                self.transition(&mut state, RoundTripState::AwaitingApproval).await;
                if reply.response_id.is_none() {
                    return Err(RoundTripError::MissingResponseId);
                }

                let decisions = self.resolve_approvals(&reply.approval_requests).await?;
                let denied: Vec<ApprovalRequest> = reply
                    .approval_requests
                    .iter()
                    .zip(&decisions)
                    .filter(|(_, decision)| !decision.approve)
                    .map(|(request, _)| request.clone())
                    .collect();

                if !denied.is_empty() && self.denial == DenialPolicy::Stop {
                    break Outcome::Denied { requests: denied };
                }

                for (request, decision) in reply.approval_requests.iter().zip(decisions) {
                    if !decision.approve {
                        conversation.push_assistant(
                            None,
                            vec![ToolInvocation::remote(
                                &request.id,
                                &request.server_label,
                                &request.tool_name,
                                &request.arguments,
                            )],
                        )?;
                        conversation.push_tool_result(&request.id, DENIED_MESSAGE, true)?;
                    }
                    pending.push(ContinuationItem::Approval(decision));
                }
                force_chain = true;
                progressed = true;
            }

            if !reply.invocations.is_empty() {
                self.transition(&mut state, RoundTripState::Executing).await;
                let text = Some(reply.text.clone()).filter(|t| !t.is_empty());
                conversation.push_assistant(text, reply.invocations.clone())?;

                let results = match self.execute_all(&reply.invocations).await {
                    Ok(results) => results,
                    Err(error) => {
                        // the conversation stays resumable with every invocation answered
                        for invocation in &reply.invocations {
                            conversation.push_tool_result(&invocation.id, ToolFailure::Cancelled.to_string(), true)?;
                        }
                        return Err(error);
                    }
                };
                for (invocation, result) in reply.invocations.iter().zip(results) {
                    let (content, is_error) = match result {
                        Ok(output) => (output, false),
                        Err(failure) => (failure.to_string(), true),
                    };
                    conversation.push_tool_result(&invocation.id, content.clone(), is_error)?;
                    pending.push(ContinuationItem::Message(Message::Tool {
                        invocation_id: invocation.id.clone(),
                        content,
                        is_error,
                    }));
                }

                // a forced choice would force the tool again on resubmission
                if matches!(tool_choice, ToolChoice::Required | ToolChoice::Function(_)) {
                    tool_choice = ToolChoice::Auto;
                }
                progressed = true;
            }

            if progressed {
                let chain = force_chain || (self.history == HistoryMode::Chain && self.backend.supports_chaining());
                previous = match &reply.response_id {
                    Some(id) if chain => Some(id.clone()),
                    _ => {
                        pending.clear();
                        None
                    }
                };
                continue;
            }

            conversation.push_assistant(Some(reply.text.clone()), vec![])?;
            break self.final_outcome(reply.text)?;
        };

        self.transition(&mut state, RoundTripState::Done).await;
        info!(target: "roundtrip::status", session = %self.session_id, submissions, "finished: {}", outcome_kind(&outcome));
        self.emit(RoundTripEvent::Finished { outcome: outcome.clone() }).await;

        Ok(RoundTripResult {
            outcome,
            response_id,
            submissions,
            images,
            remote_calls,
        })
    }

    fn request(&self, input: RequestInput, tool_choice: &ToolChoice) -> ModelRequest {
        ModelRequest {
            model: self.model.clone(),
            instructions: self.instructions.clone(),
            input,
            declarations: self.declarations.clone(),
            tool_choice: tool_choice.clone(),
            max_output_tokens: self.max_output_tokens,
            output_schema: self.output_schema.clone(),
            reasoning: self.reasoning,
            include: self.include.clone(),
            temperature: self.temperature,
        }
    }

    async fn submit(&self, request: &ModelRequest) -> Result<ModelReply, RoundTripError> {
        let submission = async {
            if self.streaming {
                self.submit_stream(request).await
            } else {
                self.backend.submit(request).await.map_err(RoundTripError::from)
            }
        };

        tokio::select! {
            reply = submission => reply,
            _ = self.cancellation.cancelled() => Err(RoundTripError::Cancelled),
        }
    }

    async fn submit_stream(&self, request: &ModelRequest) -> Result<ModelReply, RoundTripError> {
        let mut stream = self.backend.submit_stream(request).await?;
        let mut accumulator = StreamAccumulator::new();

        while let Some(event) = stream.next().await {
            let event = event?;
            trace!(target: "roundtrip::stream", "{:?}", event);
            if let StreamEvent::ContentDelta(delta) = &event {
                self.emit(RoundTripEvent::ContentDelta { delta: delta.clone() }).await;
            }
            accumulator.push(event);
            if accumulator.is_completed() {
                break;
            }
        }

        Ok(accumulator.finish()?)
    }

    async fn resolve_approvals(&self, requests: &[ApprovalRequest]) -> Result<Vec<ApprovalDecision>, RoundTripError> {
        let mut decisions = Vec::with_capacity(requests.len());
        for request in requests {
            self.emit(RoundTripEvent::ApprovalRequested { request: request.clone() }).await;

            let decision = match self.consent.decide(request) {
                Some(decision) => decision,
                None => self.approvals.decide(request).await?,
            };
            info!(
                target: "roundtrip::approval",
                "{}.{} ({}) approve={}",
                request.server_label,
                request.tool_name,
                request.id,
                decision.approve
            );

            self.emit(RoundTripEvent::ApprovalResolved {
                request: request.clone(),
                decision: decision.clone(),
            })
            .await;
            decisions.push(decision);
        }
        Ok(decisions)
    }

    async fn record_remote_calls(
        &self,
        conversation: &mut Conversation,
        calls: &[RemoteCall],
    ) -> Result<(), RoundTripError> {
        for call in calls {
            conversation.push_assistant(
                None,
                vec![ToolInvocation::remote(&call.id, &call.server_label, &call.name, &call.arguments)],
            )?;
            let (content, is_error) = match &call.error {
                Some(error) => (ToolFailure::Remote(error.clone()).to_string(), true),
                None => (call.output.clone().unwrap_or_default(), false),
            };
            if is_error {
                warn!(target: "roundtrip::tool", "{}.{} failed: {}", call.server_label, call.name, content);
            }
            conversation.push_tool_result(&call.id, content, is_error)?;
            self.emit(RoundTripEvent::RemoteToolCompleted { call: call.clone() }).await;
        }
        Ok(())
    }

    /// Resolve every invocation of a batch, results in invocation order
    async fn execute_all(&self, invocations: &[ToolInvocation]) -> Result<Vec<Result<String, ToolFailure>>, RoundTripError> {
        let batch = join_all(invocations.iter().map(|invocation| self.execute_one(invocation)));

        tokio::select! {
            results = batch => Ok(results),
            _ = self.cancellation.cancelled() => {
                warn!(target: "roundtrip::tool", session = %self.session_id, "tool execution cancelled");
                Err(RoundTripError::Cancelled)
            }
        }
    }

    async fn execute_one(&self, invocation: &ToolInvocation) -> Result<String, ToolFailure> {
        self.emit(RoundTripEvent::ToolStarted { invocation: invocation.clone() }).await;
        let started = Instant::now();

        let result = self.dispatch(invocation).await;
        match &result {
            Ok(output) => debug!(target: "roundtrip::tool", "{} ({}) -> {}", invocation.name, invocation.id, output),
            Err(failure) => warn!(target: "roundtrip::tool", "{} ({}) failed: {}", invocation.name, invocation.id, failure),
        }

        self.emit(RoundTripEvent::ToolCompleted {
            invocation: invocation.clone(),
            result: result.clone(),
            duration: started.elapsed(),
        })
        .await;
        result
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> Result<String, ToolFailure> {
        let Some(tool) = self.local_tool(&invocation.name) else {
            return Err(ToolFailure::UnknownTool(invocation.name.clone()));
        };

        if let Some(capability) = self.missing_capability(&**tool) {
            return Err(ToolFailure::NotPermitted { tool: invocation.name.clone(), capability });
        }

        let arguments = invocation.parsed_arguments().map_err(|e| ToolFailure::InvalidArguments {
            tool: invocation.name.clone(),
            reason: e.to_string(),
        })?;

        match tool.execute_json(arguments).await? {
            ToolResult::Success { output, .. } => Ok(output),
            ToolResult::Error { error, .. } => Err(ToolFailure::Execution(error)),
        }
    }

    fn missing_capability(&self, tool: &dyn AnyTool) -> Option<ToolCapability> {
        let granted = self.granted.as_ref()?;
        tool.tool_capabilities().iter().find(|c| !granted.contains(c)).copied()
    }

    fn local_tool(&self, name: &str) -> Option<&Arc<dyn AnyTool>> {
        self.declarations
            .iter()
            .filter_map(ToolDeclaration::as_local)
            .find(|tool| tool.name() == name)
    }

    /// Terminal outcome of a reply without invocation
    ///
    /// With an output schema the text must be JSON conforming to it, unless
    /// it is a payload flagged as a refusal.
    fn final_outcome(&self, text: String) -> Result<Outcome, RoundTripError> {
        let Some(schema) = &self.output_schema else {
            return Ok(Outcome::Done { text });
        };

        let value: Value = serde_json::from_str(&text).map_err(|e| SchemaError {
            path: String::new(),
            message: format!("invalid JSON: {}", e),
        })?;

        if let Some(reason) = refusal_flag(&value) {
            return Ok(Outcome::Refusal { reason });
        }

        validate(&value, &schema.schema)?;
        Ok(Outcome::Structured { value, text })
    }

    async fn transition(&self, state: &mut RoundTripState, to: RoundTripState) {
        if *state == to {
            return;
        }
        let from = std::mem::replace(state, to);
        debug!(target: "roundtrip::status", session = %self.session_id, "{} -> {}", from, to);
        self.emit(RoundTripEvent::StateChanged { from, to }).await;
    }

    async fn emit(&self, event: RoundTripEvent) {
        for handler in &self.handlers {
            handler.handle_event(event.clone()).await;
        }
    }
}

fn outcome_kind(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Done { .. } => "done",
        Outcome::Structured { .. } => "structured",
        Outcome::Refusal { .. } => "refusal",
        Outcome::Incomplete { .. } => "incomplete",
        Outcome::Denied { .. } => "denied",
    }
}
