use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use async_trait::async_trait;
use chrono::Utc;
use crate::roundtrip::{RoundTripEvent, RoundTripEventHandler};

/// Appends every round trip event to a log file
pub struct FileEventLogger {
    log_path: PathBuf,
}

impl FileEventLogger {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    fn format_event(event: &RoundTripEvent) -> String {
        match event {
            RoundTripEvent::Submitted { round, chained } => {
                format!("Submitted: round={} chained={}", round, chained)
            }
            RoundTripEvent::Responded { round, response_id, invocations, approval_requests } => {
                format!(
                    "Responded: round={} id={} invocations={} approvals={}",
                    round,
                    response_id.as_deref().unwrap_or("-"),
                    invocations,
                    approval_requests
                )
            }
            RoundTripEvent::ToolStarted { invocation } => {
                format!("ToolStarted: {} {} {}", invocation.id, invocation.name, invocation.arguments)
            }
            RoundTripEvent::ToolCompleted { invocation, result, duration } => {
                format!("ToolCompleted: {} {} in {:?} - {:?}", invocation.id, invocation.name, duration, result)
            }
            RoundTripEvent::ApprovalRequested { request } => {
                format!("ApprovalRequested: {} {}.{}", request.id, request.server_label, request.tool_name)
            }
            RoundTripEvent::ApprovalResolved { request, decision } => {
                format!("ApprovalResolved: {} approve={}", request.id, decision.approve)
            }
            RoundTripEvent::RemoteToolCompleted { call } => {
                format!("RemoteToolCompleted: {} {}.{} error={:?}", call.id, call.server_label, call.name, call.error)
            }
            RoundTripEvent::ContentDelta { delta } => {
                format!("ContentDelta: {:?}", delta)
            }
            RoundTripEvent::StateChanged { from, to } => {
                format!("StateChanged: {} -> {}", from, to)
            }
            RoundTripEvent::Finished { outcome } => {
                format!("Finished: {:?}", outcome)
            }
        }
    }

    fn write_event(&self, event: &RoundTripEvent) {
        let timestamp = Utc::now();
        let log_line = format!(
            "[{}] {}\n",
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            Self::format_event(event)
        );

        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
        {
            let _ = file.write_all(log_line.as_bytes());
            let _ = file.flush();
        }
    }
}

#[async_trait]
impl RoundTripEventHandler for FileEventLogger {
    async fn handle_event(&self, event: RoundTripEvent) {
        self.write_event(&event);
    }
}

impl Default for FileEventLogger {
    fn default() -> Self {
        Self::new("roundtrip_events.log")
    }
}
