use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{Event, Level, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type LogError = Box<dyn std::error::Error + Send + Sync>;

/// Targets raised to the configured level, everything else stays at warn
pub const TARGETS: &[&str] = &[
    "relay_core",
    "relay_llm",
    "roundtrip::submit",
    "roundtrip::status",
    "roundtrip::tool",
    "roundtrip::approval",
    "roundtrip::stream",
    "llm::http",
];

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

fn target_color(target: &str) -> Option<&'static str> {
    match target {
        "roundtrip::submit" => Some("\x1b[38;5;213m"),
        "roundtrip::tool" => Some("\x1b[38;5;51m"),
        "roundtrip::approval" => Some("\x1b[38;5;226m"),
        "roundtrip::status" => Some("\x1b[38;5;82m"),
        "roundtrip::stream" => Some("\x1b[38;5;208m"),
        "llm::http" => Some("\x1b[38;5;128m"),
        _ => None,
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[34m",
        Level::TRACE => "\x1b[35m",
    }
}

/// Console formatter, round trip targets get their own color and the
/// messages of other targets are dimmed
struct ColoredFormatter;

impl<S, N> FormatEvent<S, N> for ColoredFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let metadata = event.metadata();
        let (target, message) = match target_color(metadata.target()) {
            Some(color) => (color, ""),
            None => (DIM, DIM),
        };

        write!(
            writer,
            "{} {}{:5}{} {}[{}]{} {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            level_color(metadata.level()),
            metadata.level(),
            RESET,
            target,
            metadata.target(),
            RESET,
            message
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer, "{}", RESET)
    }
}

/// Logging configuration of the round trip client
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level of the relay targets ("off", "error", ... "trace")
    pub level: String,
    /// Daily rolling file instead of the console
    pub file_path: Option<PathBuf>,
    pub include_spans: bool,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "off".to_string(),
            file_path: None,
            include_spans: false,
            json_format: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true" || v == "1").unwrap_or(false)
}

impl LoggingConfig {
    /// RELAY_LOG_LEVEL, RELAY_LOG_FILE, RELAY_LOG_SPANS and RELAY_LOG_JSON
    pub fn from_env() -> Self {
        Self {
            level: std::env::var("RELAY_LOG_LEVEL").unwrap_or_else(|_| "off".to_string()),
            file_path: std::env::var("RELAY_LOG_FILE").ok().map(PathBuf::from),
            include_spans: env_flag("RELAY_LOG_SPANS"),
            json_format: env_flag("RELAY_LOG_JSON"),
        }
    }

    pub fn level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    pub fn file_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.include_spans = enable;
        self
    }

    pub fn json_format(mut self, enable: bool) -> Self {
        self.json_format = enable;
        self
    }

    /// Warn everywhere, the configured level on the relay targets
    pub fn filter(&self) -> Result<EnvFilter, LogError> {
        let mut filter = EnvFilter::from_default_env().add_directive("warn".parse()?);
        for target in TARGETS {
            filter = filter.add_directive(format!("{}={}", target, self.level).parse()?);
        }
        Ok(filter)
    }

    /// Install the global subscriber, fails if one is already set
    pub fn init(self) -> Result<(), LogError> {
        let filter = self.filter()?;
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match (&self.file_path, self.json_format) {
            (Some(path), true) => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_appender(path))
                .with_span_events(span_events)
                .boxed(),
            // no colors in files
            (Some(path), false) => tracing_subscriber::fmt::layer()
                .with_writer(file_appender(path))
                .with_span_events(span_events)
                .with_ansi(false)
                .boxed(),
            (None, true) => tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(span_events)
                .boxed(),
            (None, false) => tracing_subscriber::fmt::layer()
                .event_format(ColoredFormatter)
                .with_ansi(true)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
            .map_err(|_| "Failed to initialize subscriber (already set)")?;
        Ok(())
    }
}

fn file_appender(path: &Path) -> RollingFileAppender {
    RollingFileAppender::new(
        Rotation::DAILY,
        path.parent().unwrap_or_else(|| Path::new(".")),
        path.file_name().unwrap_or_else(|| OsStr::new("relay.log")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_off() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "off");
        assert!(config.file_path.is_none());
        assert!(config.filter().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = LoggingConfig::default()
            .level("debug")
            .file_path("/tmp/relay.log")
            .with_spans(true)
            .json_format(true);

        assert_eq!(config.level, "debug");
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/relay.log")));
        assert!(config.include_spans && config.json_format);
        assert!(config.filter().is_ok());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        assert!(LoggingConfig::default().level("loud").filter().is_err());
    }

    #[test]
    fn test_every_colored_target_is_filtered() {
        for target in TARGETS.iter().filter(|t| t.contains("::")) {
            assert!(target_color(target).is_some(), "{} has no color", target);
        }
    }
}
