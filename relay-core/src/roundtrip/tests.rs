use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use relay_llm::LlmError;
use relay_llm::responses::{IncompleteReason, ToolChoice};
use relay_llm::StructuredReply;

use crate::backend::{
    ApprovalRequest, ContinuationItem, ModelBackend, ModelReply, ModelRequest, RemoteCall,
    ReplyStream, RequestInput, StreamEvent,
};
use crate::conversation::{Conversation, Message, ToolInvocation};
use crate::logging::LoggingConfig;
use crate::tools::{tool, ToolCapability, ToolFailure, ToolResult, WeatherTool};
use super::*;

static INIT_LOGGING: Once = Once::new();

fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = LoggingConfig::from_env().init();
    });
}

/// Backend replaying canned replies and recording every request
struct ScriptedBackend {
    replies: Mutex<VecDeque<ModelReply>>,
    requests: Mutex<Vec<ModelRequest>>,
    chaining: bool,
    chunk_size: usize,
}

impl ScriptedBackend {
    fn new(replies: Vec<ModelReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(vec![]),
            chaining: true,
            chunk_size: 3,
        })
    }

    fn without_chaining(replies: Vec<ModelReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(vec![]),
            chaining: false,
            chunk_size: 3,
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn submissions(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports_chaining(&self) -> bool {
        self.chaining
    }

    async fn submit(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "script exhausted".into())
    }

    async fn submit_stream(&self, request: &ModelRequest) -> Result<ReplyStream, LlmError> {
        let reply = self.submit(request).await?;
        let chars: Vec<char> = reply.text.chars().collect();
        let mut events: Vec<Result<StreamEvent, LlmError>> = chars
            .chunks(self.chunk_size)
            .map(|chunk| Ok(StreamEvent::ContentDelta(chunk.iter().collect())))
            .collect();
        events.push(Ok(StreamEvent::Completed(reply)));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SleepParams {
    duration_ms: u64,
    label: String,
}

struct SleepingTool;

#[tool(name = "sleeping_tool", description = "A tool that sleeps for a specified duration")]
impl SleepingTool {
    async fn execute(&self, params: SleepParams) -> ToolResult {
        tokio::time::sleep(Duration::from_millis(params.duration_ms)).await;
        ToolResult::success(params.label)
    }
}

struct BrokenTool;

#[tool(name = "broken_tool", description = "A tool that always fails")]
impl BrokenTool {
    async fn execute(&self, params: crate::tools::ToolEmptyParams) -> ToolResult {
        ToolResult::error("disk on fire".to_string())
    }
}

/// Counts its runs, needs to write
struct JournalTool {
    runs: Arc<AtomicUsize>,
}

#[tool(name = "journal", description = "Append a line to the journal", capabilities = [Write])]
impl JournalTool {
    async fn execute(&self, params: crate::tools::ToolEmptyParams) -> ToolResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        ToolResult::success("written".to_string())
    }
}

fn sleep_call(id: &str, duration_ms: u64, label: &str) -> ToolInvocation {
    ToolInvocation::new(
        id,
        "sleeping_tool",
        json!({"duration_ms": duration_ms, "label": label}).to_string(),
    )
}

fn approval_request(id: &str) -> ApprovalRequest {
    ApprovalRequest {
        id: id.to_string(),
        server_label: "deepwiki".to_string(),
        tool_name: "ask_question".to_string(),
        arguments: r#"{"repoName":"modelcontextprotocol/modelcontextprotocol","question":"transports?"}"#.to_string(),
    }
}

fn remote_call(id: &str, output: Option<&str>, error: Option<&str>) -> RemoteCall {
    RemoteCall {
        id: id.to_string(),
        server_label: "deepwiki".to_string(),
        name: "ask_question".to_string(),
        arguments: "{}".to_string(),
        output: output.map(str::to_string),
        error: error.map(str::to_string),
    }
}

fn approvals_sent(requests: &[ModelRequest]) -> Vec<(String, bool)> {
    requests
        .iter()
        .filter_map(|request| match &request.input {
            RequestInput::Continuation { items, .. } => Some(items),
            RequestInput::Conversation(_) => None,
        })
        .flatten()
        .filter_map(|item| match item {
            ContinuationItem::Approval(decision) => Some((decision.request_id.clone(), decision.approve)),
            _ => None,
        })
        .collect()
}

fn tool_messages(conversation: &Conversation) -> Vec<(String, String, bool)> {
    conversation
        .messages()
        .iter()
        .filter_map(|message| match message {
            Message::Tool { invocation_id, content, is_error } => {
                Some((invocation_id.clone(), content.clone(), *is_error))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_no_invocation_means_one_submission() {
    init_test_logging();
    let backend = ScriptedBackend::new(vec![ModelReply::text("A unicorn dreamt of rainbows.").with_id("resp_1")]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .local_tool(SleepingTool)
        .build();

    let mut conversation = Conversation::new();
    conversation.user("Tell me a bedtime story about a unicorn.");
    let result = trip.run(&mut conversation).await.unwrap();

    assert_eq!(backend.submissions(), 1);
    assert_eq!(result.submissions, 1);
    assert_eq!(result.outcome, Outcome::Done { text: "A unicorn dreamt of rainbows.".into() });
    assert_eq!(result.response_id.as_deref(), Some("resp_1"));
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.last_answer(), Some("A unicorn dreamt of rainbows."));
}

#[tokio::test]
async fn test_all_invocations_answered_in_order_before_resubmission() {
    init_test_logging();
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("")
            .with_id("resp_1")
            .with_invocation(sleep_call("call_slow", 150, "slow"))
            .with_invocation(sleep_call("call_fast", 1, "fast"))
            .with_invocation(sleep_call("call_mid", 50, "mid")),
        ModelReply::text("all done").with_id("resp_2"),
    ]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .local_tool(SleepingTool)
        .build();

    let mut conversation = Conversation::new();
    conversation.user("sleep three times");
    let result = trip.run(&mut conversation).await.unwrap();
    assert_eq!(result.submissions, 2);

    let expected = vec![
        ("call_slow".to_string(), "slow".to_string(), false),
        ("call_fast".to_string(), "fast".to_string(), false),
        ("call_mid".to_string(), "mid".to_string(), false),
    ];
    assert_eq!(tool_messages(&conversation), expected);

    let requests = backend.requests();
    let RequestInput::Conversation(resent) = &requests[1].input else {
        panic!("resend mode must send the conversation");
    };
    assert_eq!(tool_messages(resent), expected);
    assert!(resent.pending_invocations().is_empty());
}

#[tokio::test]
async fn test_undeclared_tool_yields_unknown_tool() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("")
            .with_id("resp_1")
            .with_invocation(ToolInvocation::new("call_1", "delete_everything", "{}"))
            .with_invocation(sleep_call("call_2", 1, "ok")),
        ModelReply::text("sorry, I cannot do that").with_id("resp_2"),
    ]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .local_tool(SleepingTool)
        .build();

    let mut conversation = Conversation::new();
    conversation.user("clean up");
    let result = trip.run(&mut conversation).await.unwrap();

    assert!(result.outcome.is_done());
    let messages = tool_messages(&conversation);
    assert_eq!(messages[0], ("call_1".into(), "unknown tool 'delete_everything'".into(), true));
    assert_eq!(messages[1], ("call_2".into(), "ok".into(), false));
}

#[tokio::test]
async fn test_tool_failures_are_reported_to_the_model() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("")
            .with_id("resp_1")
            .with_invocation(ToolInvocation::new("call_1", "broken_tool", "{}"))
            .with_invocation(ToolInvocation::new("call_2", "sleeping_tool", r#"{"label": 3}"#))
            .with_invocation(ToolInvocation::new("call_3", "sleeping_tool", "{not json")),
        ModelReply::text("the tools failed").with_id("resp_2"),
    ]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .local_tool(SleepingTool)
        .local_tool(BrokenTool)
        .build();

    let mut conversation = Conversation::new();
    conversation.user("try");
    trip.run(&mut conversation).await.unwrap();

    let messages = tool_messages(&conversation);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].1, "tool execution failed: disk on fire");
    assert!(messages[1].1.starts_with("invalid arguments for tool 'sleeping_tool'"));
    assert!(messages[2].1.starts_with("invalid arguments for tool 'sleeping_tool'"));
    assert!(messages.iter().all(|(_, _, is_error)| *is_error));
}

#[tokio::test]
async fn test_tool_without_granted_capability_does_not_run() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("")
            .with_id("resp_1")
            .with_invocation(ToolInvocation::new("call_1", "journal", "{}"))
            .with_invocation(sleep_call("call_2", 1, "slept")),
        ModelReply::text("could not write").with_id("resp_2"),
    ]);
    let runs = Arc::new(AtomicUsize::new(0));
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .local_tool(JournalTool { runs: runs.clone() })
        .local_tool(SleepingTool)
        .capabilities([ToolCapability::Read, ToolCapability::Network])
        .build();

    let mut conversation = Conversation::new();
    conversation.user("note that down");
    trip.run(&mut conversation).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(
        tool_messages(&conversation),
        vec![
            (
                "call_1".to_string(),
                "tool 'journal' needs the Write capability, which is not granted".to_string(),
                true
            ),
            ("call_2".to_string(), "slept".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn test_every_capability_is_granted_by_default() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("")
            .with_id("resp_1")
            .with_invocation(ToolInvocation::new("call_1", "journal", "{}")),
        ModelReply::text("written").with_id("resp_2"),
    ]);
    let runs = Arc::new(AtomicUsize::new(0));
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .local_tool(JournalTool { runs: runs.clone() })
        .build();

    trip.ask("note that down").await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_denied_approval_is_never_transmitted_as_approved() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("")
            .with_id("resp_1")
            .with_approval_request(approval_request("mcpr_1")),
        ModelReply::text("I could not consult the server.").with_id("resp_2"),
    ]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .tool(McpServer::new("deepwiki", "https://mcp.deepwiki.com/mcp"))
        .approval_handler(closure_approver(|_: &ApprovalRequest| false))
        .build();

    let mut conversation = Conversation::new();
    conversation.user("What transport protocols does the MCP spec support?");
    let result = trip.run(&mut conversation).await.unwrap();

    assert!(result.outcome.is_done());
    let requests = backend.requests();
    assert_eq!(approvals_sent(&requests), vec![("mcpr_1".to_string(), false)]);
    assert_eq!(requests[1].previous_response_id(), Some("resp_1"));
    assert!(result.remote_calls.is_empty());

    let messages = tool_messages(&conversation);
    assert_eq!(messages, vec![("mcpr_1".into(), DENIED_MESSAGE.into(), true)]);
}

#[tokio::test]
async fn test_denial_policy_stop() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("")
        .with_id("resp_1")
        .with_approval_request(approval_request("mcpr_1"))
        .with_approval_request(approval_request("mcpr_2"))]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .tool(McpServer::new("deepwiki", "https://mcp.deepwiki.com/mcp"))
        .approval_handler(closure_approver(|r: &ApprovalRequest| r.id == "mcpr_1"))
        .denial_policy(DenialPolicy::Stop)
        .build();

    let (result, _) = trip.ask("question").await.unwrap();

    assert_eq!(backend.submissions(), 1);
    match result.outcome {
        Outcome::Denied { requests } => {
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].id, "mcpr_2");
        }
        other => panic!("expected denied, got {:?}", other),
    }
}

#[tokio::test]
async fn test_approved_call_is_chained_and_recorded() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("")
            .with_id("resp_1")
            .with_approval_request(approval_request("mcpr_1")),
        ModelReply::text("It supports stdio and streamable HTTP.")
            .with_id("resp_2")
            .with_remote_call(remote_call("mcp_1", Some("stdio, streamable HTTP"), None)),
    ]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .tool(McpServer::new("deepwiki", "https://mcp.deepwiki.com/mcp"))
        .consent(ConsentRules::new().rule(ConsentRule::allow("deepwiki", "ask_question")))
        .build();

    let mut conversation = Conversation::new();
    conversation.user("What transport protocols does the MCP spec support?");
    let result = trip.run(&mut conversation).await.unwrap();

    let requests = backend.requests();
    assert_eq!(approvals_sent(&requests), vec![("mcpr_1".to_string(), true)]);
    let RequestInput::Continuation { previous_response_id, items } = &requests[1].input else {
        panic!("approvals must be chained");
    };
    assert_eq!(previous_response_id, "resp_1");
    assert_eq!(items.len(), 1);

    assert_eq!(result.remote_calls.len(), 1);
    assert_eq!(tool_messages(&conversation), vec![("mcp_1".into(), "stdio, streamable HTTP".into(), false)]);
    let invocation = conversation.invocation("mcp_1").unwrap();
    assert_eq!(invocation.server_label.as_deref(), Some("deepwiki"));
}

#[tokio::test]
async fn test_remote_error_is_recorded() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("The server failed.")
        .with_id("resp_1")
        .with_remote_call(remote_call("mcp_1", None, Some("upstream timeout")))]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .tool(McpServer::new("deepwiki", "https://mcp.deepwiki.com/mcp").require_approval(relay_llm::responses::McpApproval::Never))
        .build();

    let (result, conversation) = trip.ask("question").await.unwrap();

    assert!(result.outcome.is_done());
    assert_eq!(
        tool_messages(&conversation),
        vec![("mcp_1".into(), "remote tool error: upstream timeout".into(), true)]
    );
}

#[tokio::test]
async fn test_approval_without_response_id() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("").with_approval_request(approval_request("mcpr_1"))]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1").approve_all().build();

    let err = trip.ask("question").await.unwrap_err();
    assert!(matches!(err, RoundTripError::MissingResponseId));
}

#[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
struct MathReasoning {
    steps: Vec<Step>,
    final_answer: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
struct Step {
    explanation: String,
    output: String,
}

#[tokio::test]
async fn test_structured_refusal_is_not_a_schema_violation() {
    let backend = ScriptedBackend::new(vec![ModelReply::text(
        r#"{"refusal": true, "refusal_reason": "not a math question"}"#,
    )]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .structured::<MathReasoning>("math_reasoning")
        .build();

    let (result, _) = trip.ask("how do I build a bomb").await.unwrap();
    assert_eq!(result.outcome, Outcome::Refusal { reason: "not a math question".into() });

    let reply = result.structured::<MathReasoning>().unwrap().unwrap();
    assert!(reply.is_refusal());
}

#[tokio::test]
async fn test_provider_refusal() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("").with_refusal("I can't help with that.")]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .structured::<MathReasoning>("math_reasoning")
        .build();

    let (result, _) = trip.ask("how do I build a bomb").await.unwrap();
    assert_eq!(result.outcome, Outcome::Refusal { reason: "I can't help with that.".into() });
}

#[tokio::test]
async fn test_structured_output() {
    let answer = json!({
        "steps": [
            {"explanation": "Subtract 7 from both sides.", "output": "8x = -30"},
            {"explanation": "Divide both sides by 8.", "output": "x = -3.75"}
        ],
        "final_answer": "x = -3.75"
    });
    let backend = ScriptedBackend::new(vec![ModelReply::text(answer.to_string())]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .structured::<MathReasoning>("math_reasoning")
        .build();

    let (result, _) = trip.ask("how can I solve 8x + 7 = -23").await.unwrap();
    let Some(Ok(StructuredReply::Parsed(reasoning))) = result.structured::<MathReasoning>() else {
        panic!("expected parsed output, got {:?}", result.outcome);
    };
    assert_eq!(reasoning.steps.len(), 2);
    assert_eq!(reasoning.final_answer, "x = -3.75");

    let schema = backend.requests()[0].output_schema.clone().unwrap();
    assert_eq!(schema.name, "math_reasoning");
    assert_eq!(schema.schema["additionalProperties"], json!(false));
}

#[tokio::test]
async fn test_schema_violation() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text(r#"{"steps": [{"explanation": "guess"}], "final_answer": "42"}"#),
        ModelReply::text("forty two"),
    ]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .structured::<MathReasoning>("math_reasoning")
        .build();

    match trip.ask("solve").await.unwrap_err() {
        RoundTripError::SchemaViolation(error) => assert_eq!(error.path, "/steps/0"),
        other => panic!("expected schema violation, got {:?}", other),
    }
    assert!(matches!(trip.ask("solve").await.unwrap_err(), RoundTripError::SchemaViolation(_)));
}

#[tokio::test]
async fn test_incomplete_keeps_partial_output() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("Once upon a time")
        .with_id("resp_1")
        .incomplete(IncompleteReason::MaxOutputTokens)]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1").max_output_tokens(16).build();

    let (result, conversation) = trip.ask("tell me a long story").await.unwrap();
    assert_eq!(
        result.outcome,
        Outcome::Incomplete { reason: IncompleteReason::MaxOutputTokens, partial: "Once upon a time".into() }
    );
    assert_eq!(result.text(), Some("Once upon a time"));
    assert_eq!(conversation.last_answer(), Some("Once upon a time"));
}

#[tokio::test]
async fn test_streamed_deltas_reproduce_final_text() {
    let text = "The quick brown fox jumps over the lazy dog, twice.";
    let streamed_backend = ScriptedBackend::new(vec![ModelReply::text(text).with_id("resp_1")]);
    let plain_backend = ScriptedBackend::new(vec![ModelReply::text(text).with_id("resp_1")]);

    let deltas = Arc::new(Mutex::new(Vec::<String>::new()));
    let collected = deltas.clone();
    let streamed = RoundTripBuilder::new(streamed_backend, "gpt-4.1")
        .streaming(true)
        .build()
        .on_event(move |event| {
            if let RoundTripEvent::ContentDelta { delta } = event {
                collected.lock().unwrap().push(delta);
            }
        });
    let plain = RoundTripBuilder::new(plain_backend, "gpt-4.1").build();

    let (streamed_result, _) = streamed.ask("fox").await.unwrap();
    let (plain_result, _) = plain.ask("fox").await.unwrap();

    let deltas = deltas.lock().unwrap();
    assert!(deltas.len() > 1);
    assert_eq!(deltas.concat(), plain_result.text().unwrap());
    assert_eq!(streamed_result.outcome, plain_result.outcome);
}

#[test]
fn test_accumulator_concatenates_split_arguments() {
    let mut accumulator = StreamAccumulator::new();
    for delta in ["{\"lat", "itude\": 48.85", "66}"] {
        accumulator.push(StreamEvent::ToolArgumentsDelta { item_id: "fc_1".into(), delta: delta.into() });
    }
    accumulator.push(StreamEvent::ToolArgumentsDelta { item_id: "fc_2".into(), delta: "{}".into() });
    accumulator.push(StreamEvent::ContentDelta("Hel".into()));
    accumulator.push(StreamEvent::ContentDelta("lo".into()));

    assert_eq!(accumulator.arguments("fc_1"), Some("{\"latitude\": 48.8566}"));
    assert_eq!(accumulator.arguments("fc_2"), Some("{}"));
    assert!(!accumulator.is_completed());

    accumulator.push(StreamEvent::Completed(ModelReply::text("")));
    assert_eq!(accumulator.finish().unwrap().text, "Hello");
}

#[test]
fn test_accumulator_errors() {
    let mut accumulator = StreamAccumulator::new();
    accumulator.push(StreamEvent::ContentDelta("partial".into()));
    assert!(accumulator.finish().is_err());

    let mut accumulator = StreamAccumulator::new();
    accumulator.push(StreamEvent::Error("rate limited".into()));
    assert_eq!(accumulator.finish().unwrap_err().to_string(), "rate limited");
}

#[tokio::test]
async fn test_max_rounds() {
    let replies = (0..5)
        .map(|i| ModelReply::text("").with_id(format!("resp_{}", i)).with_invocation(sleep_call(&format!("call_{}", i), 1, "again")))
        .collect();
    let backend = ScriptedBackend::new(replies);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .local_tool(SleepingTool)
        .max_rounds(3)
        .build();

    let err = trip.ask("loop forever").await.unwrap_err();
    assert!(matches!(err, RoundTripError::MaxRoundsReached(3)));
    assert_eq!(backend.submissions(), 3);
}

#[tokio::test]
async fn test_chain_mode_sends_only_tool_outputs() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("")
            .with_id("resp_1")
            .with_invocation(sleep_call("call_1", 1, "rested")),
        ModelReply::text("rested well").with_id("resp_2"),
    ]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .local_tool(SleepingTool)
        .history(HistoryMode::Chain)
        .tool_choice(ToolChoice::Function("sleeping_tool".into()))
        .build();

    trip.ask("take a nap").await.unwrap();

    let requests = backend.requests();
    assert_eq!(requests[0].tool_choice, ToolChoice::Function("sleeping_tool".into()));
    assert_eq!(requests[1].tool_choice, ToolChoice::Auto);
    let RequestInput::Continuation { previous_response_id, items } = &requests[1].input else {
        panic!("chain mode must continue on the previous response");
    };
    assert_eq!(previous_response_id, "resp_1");
    assert_eq!(
        items,
        &vec![ContinuationItem::Message(Message::Tool {
            invocation_id: "call_1".into(),
            content: "rested".into(),
            is_error: false,
        })]
    );
}

#[tokio::test]
async fn test_chain_mode_falls_back_to_resend_without_chaining_support() {
    let backend = ScriptedBackend::without_chaining(vec![
        ModelReply::text("").with_id("resp_1").with_invocation(sleep_call("call_1", 1, "rested")),
        ModelReply::text("ok"),
    ]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .local_tool(SleepingTool)
        .history(HistoryMode::Chain)
        .build();

    trip.ask("take a nap").await.unwrap();
    assert!(matches!(backend.requests()[1].input, RequestInput::Conversation(_)));
}

#[tokio::test]
async fn test_previous_response_chains_the_first_submission() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("You said hello.").with_id("resp_2")]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .previous_response_id("resp_1")
        .build();

    let mut conversation = Conversation::new();
    conversation.user("hello");
    conversation.push(Message::assistant("hi")).unwrap();
    conversation.user("what did I just say?");
    let result = trip.run(&mut conversation).await.unwrap();

    assert_eq!(result.response_id.as_deref(), Some("resp_2"));
    let RequestInput::Continuation { previous_response_id, items } = &backend.requests()[0].input else {
        panic!("expected a chained submission");
    };
    assert_eq!(previous_response_id, "resp_1");
    assert_eq!(items, &vec![ContinuationItem::Message(Message::user("what did I just say?"))]);
}

#[tokio::test]
async fn test_cancel_during_tool_execution() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("")
        .with_id("resp_1")
        .with_invocation(sleep_call("call_1", 5000, "never"))]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .local_tool(SleepingTool)
        .build();

    let token = trip.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let start = std::time::Instant::now();
    let err = trip.ask("sleep").await.unwrap_err();
    assert!(matches!(err, RoundTripError::Cancelled));
    assert!(start.elapsed() < Duration::from_millis(3000), "cancellation took {:?}", start.elapsed());
}

#[tokio::test]
async fn test_cancelled_run_leaves_no_pending_invocation() {
    let backend = ScriptedBackend::new(vec![ModelReply::text("")
        .with_id("resp_1")
        .with_invocation(sleep_call("call_1", 5000, "never"))
        .with_invocation(sleep_call("call_2", 10, "quick"))]);
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .local_tool(SleepingTool)
        .build();

    let token = trip.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let mut conversation = Conversation::new();
    conversation.user("sleep");
    let err = trip.run(&mut conversation).await.unwrap_err();
    assert!(matches!(err, RoundTripError::Cancelled));

    assert!(conversation.pending_invocations().is_empty());
    let cancelled = ToolFailure::Cancelled.to_string();
    assert_eq!(
        tool_messages(&conversation),
        vec![
            ("call_1".to_string(), cancelled.clone(), true),
            ("call_2".to_string(), cancelled, true),
        ]
    );
}

#[tokio::test]
async fn test_state_changes_are_reported() {
    let backend = ScriptedBackend::new(vec![
        ModelReply::text("").with_id("resp_1").with_invocation(sleep_call("call_1", 1, "z")),
        ModelReply::text("done").with_id("resp_2"),
    ]);
    let states = Arc::new(Mutex::new(Vec::new()));
    let collected = states.clone();
    let trip = RoundTripBuilder::new(backend, "gpt-4.1")
        .local_tool(SleepingTool)
        .build()
        .on_event(move |event| {
            if let RoundTripEvent::StateChanged { to, .. } = event {
                collected.lock().unwrap().push(to);
            }
        });

    trip.ask("nap").await.unwrap();

    use RoundTripState::*;
    assert_eq!(
        *states.lock().unwrap(),
        vec![ModelResponded, Executing, AwaitingModel, ModelResponded, Done]
    );
}

#[tokio::test]
async fn test_paris_weather_scenario() {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "48.8566"))
        .and(query_param("longitude", "2.3522"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current_units": {"temperature_2m": "°C"},
            "current": {"time": "2025-06-01T12:00", "temperature_2m": 21.4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ScriptedBackend::new(vec![
        ModelReply::text("").with_id("resp_1").with_invocation(ToolInvocation::new(
            "call_paris",
            "get_weather",
            r#"{"latitude":48.8566,"longitude":2.3522}"#,
        )),
        ModelReply::text("It is currently 21.4°C in Paris.").with_id("resp_2"),
    ]);
    let trip = RoundTripBuilder::new(backend.clone(), "gpt-4.1")
        .local_tool(WeatherTool::with_base_url(server.uri()))
        .build();

    let mut conversation = Conversation::new();
    conversation.user("What's the weather like in Paris today?");
    let result = trip.run(&mut conversation).await.unwrap();

    assert_eq!(result.submissions, 2);
    assert!(result.text().unwrap().contains("21.4"));
    assert_eq!(tool_messages(&conversation), vec![("call_paris".into(), "21.4".into(), false)]);

    let requests = backend.requests();
    assert_eq!(requests[0].declarations.len(), 1);
    assert_eq!(requests[0].declarations[0].name(), "get_weather");
    assert_eq!(requests[0].declarations[0].mode(), ExecutionMode::LocalFunction);
}
