use crate::roundtrip::{Outcome, RoundTripEvent};

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Arguments longer than this are truncated in the console
const MAX_ARGUMENTS_LEN: usize = 120;

/// One line per event worth showing to a human
pub struct PrettyFormatter {
    show_deltas: bool,
}

impl PrettyFormatter {
    pub fn new() -> Self {
        Self { show_deltas: false }
    }

    /// Also print streamed content deltas
    pub fn with_deltas(mut self, enable: bool) -> Self {
        self.show_deltas = enable;
        self
    }

    pub fn format_event(&self, event: &RoundTripEvent) -> Option<String> {
        match event {
            RoundTripEvent::ToolStarted { invocation } => Some(format!(
                "{}●{} {}({}){}",
                CYAN,
                RESET,
                invocation.name,
                truncate(&invocation.arguments),
                RESET
            )),
            RoundTripEvent::ToolCompleted { invocation, result, duration } => Some(match result {
                Ok(output) => format!(
                    "  {}⎿ {}{} {}({:.1}s){}",
                    GREEN,
                    truncate(output),
                    RESET,
                    DIM,
                    duration.as_secs_f32(),
                    RESET
                ),
                Err(failure) => format!("  {}⎿ {}{}", RED, failure, RESET),
            }),
            RoundTripEvent::ApprovalRequested { request } => Some(format!(
                "{}?{} {} wants to call {}({})",
                YELLOW,
                RESET,
                request.server_label,
                request.tool_name,
                truncate(&request.arguments)
            )),
            RoundTripEvent::ApprovalResolved { request, decision } => Some(if decision.approve {
                format!("  {}⎿ approved{}", GREEN, RESET)
            } else {
                format!("  {}⎿ denied{}", RED, RESET)
            }),
            RoundTripEvent::RemoteToolCompleted { call } => Some(match (&call.error, &call.output) {
                (Some(error), _) => format!("{}●{} {}.{} {}failed: {}{}", CYAN, RESET, call.server_label, call.name, RED, error, RESET),
                (None, output) => format!(
                    "{}●{} {}.{}\n  {}⎿ {}{}",
                    CYAN,
                    RESET,
                    call.server_label,
                    call.name,
                    DIM,
                    truncate(output.as_deref().unwrap_or_default()),
                    RESET
                ),
            }),
            RoundTripEvent::ContentDelta { delta } if self.show_deltas => Some(delta.clone()),
            RoundTripEvent::Finished { outcome } => match outcome {
                Outcome::Refusal { reason } => Some(format!("{}refused:{} {}", RED, RESET, reason)),
                Outcome::Incomplete { reason, .. } => Some(format!("{}incomplete:{} {:?}", YELLOW, RESET, reason)),
                Outcome::Denied { requests } => Some(format!("{}stopped:{} {} call(s) denied", RED, RESET, requests.len())),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Default for PrettyFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(text: &str) -> String {
    let line = text.replace('\n', " ");
    if line.chars().count() <= MAX_ARGUMENTS_LEN {
        return line;
    }
    let head: String = line.chars().take(MAX_ARGUMENTS_LEN).collect();
    format!("{}…", head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::conversation::ToolInvocation;
    use crate::tools::ToolFailure;

    #[test]
    fn test_tool_lines() {
        let formatter = PrettyFormatter::new();
        let invocation = ToolInvocation::new("call_1", "get_weather", r#"{"latitude":48.8566}"#);

        let started = formatter
            .format_event(&RoundTripEvent::ToolStarted { invocation: invocation.clone() })
            .unwrap();
        assert!(started.contains("get_weather({\"latitude\":48.8566})"));

        let failed = formatter
            .format_event(&RoundTripEvent::ToolCompleted {
                invocation,
                result: Err(ToolFailure::UnknownTool("get_weather".into())),
                duration: Duration::from_millis(3),
            })
            .unwrap();
        assert!(failed.contains("unknown tool 'get_weather'"));
    }

    #[test]
    fn test_deltas_hidden_by_default() {
        let event = RoundTripEvent::ContentDelta { delta: "Hel".into() };
        assert!(PrettyFormatter::new().format_event(&event).is_none());
        assert_eq!(PrettyFormatter::new().with_deltas(true).format_event(&event).as_deref(), Some("Hel"));
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(200);
        assert_eq!(truncate(&long).chars().count(), MAX_ARGUMENTS_LEN + 1);
        assert_eq!(truncate("a\nb"), "a b");
    }
}
