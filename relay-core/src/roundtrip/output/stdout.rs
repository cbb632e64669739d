use std::io::{self, Write};
use async_trait::async_trait;
use crate::roundtrip::{RoundTripEvent, RoundTripEventHandler};
use super::pretty::PrettyFormatter;

/// Prints round trip activity on stderr, keeping stdout for the answer
pub struct StdoutEventManager {
    formatter: PrettyFormatter,
}

impl StdoutEventManager {
    pub fn new() -> Self {
        Self {
            formatter: PrettyFormatter::new(),
        }
    }

    pub fn with_formatter(formatter: PrettyFormatter) -> Self {
        Self { formatter }
    }
}

#[async_trait]
impl RoundTripEventHandler for StdoutEventManager {
    async fn handle_event(&self, event: RoundTripEvent) {
        if let Some(formatted) = self.formatter.format_event(&event) {
            match event {
                RoundTripEvent::ContentDelta { .. } => {
                    print!("{}", formatted);
                    let _ = io::stdout().flush();
                }
                _ => eprintln!("{}", formatted),
            }
        }
    }
}

impl Default for StdoutEventManager {
    fn default() -> Self {
        Self::new()
    }
}
