//! Structured JSON logger
//!
//! - One log line = one event
//! - Deterministic key ordering: component, event, severity, then fields by key
//! - Synchronous, no buffering
//!
//! A `Logger` is a plain value threaded through constructors. Cloning it is
//! cheap; `with_component` derives a logger for a sub-component.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use super::events::Event;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, process exits
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Where log lines end up
#[derive(Debug, Clone)]
enum Sink {
    /// stdout, or stderr for ERROR and FATAL
    Console,
    /// Captured lines, for tests
    Memory(Arc<Mutex<Vec<String>>>),
    /// Dropped
    Discard,
}

/// Handle onto the lines captured by a memory logger
#[derive(Debug, Clone)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    /// All captured lines, in emission order
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Whether any captured line carries the given event
    pub fn contains_event(&self, event: Event) -> bool {
        let needle = format!("\"event\":\"{}\"", event.as_str());
        self.lines().iter().any(|line| line.contains(&needle))
    }
}

/// A structured logger that outputs JSON lines
#[derive(Debug, Clone)]
pub struct Logger {
    component: String,
    min_severity: Severity,
    sink: Sink,
}

impl Logger {
    /// Console logger for the given component at INFO
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            min_severity: Severity::Info,
            sink: Sink::Console,
        }
    }

    /// Logger that drops everything
    pub fn discard() -> Self {
        Self {
            component: String::new(),
            min_severity: Severity::Fatal,
            sink: Sink::Discard,
        }
    }

    /// Logger that captures every line in memory, at TRACE
    pub fn memory(component: impl Into<String>) -> (Self, LogCapture) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = Self {
            component: component.into(),
            min_severity: Severity::Trace,
            sink: Sink::Memory(Arc::clone(&lines)),
        };
        (logger, LogCapture { lines })
    }

    /// Set the minimum severity that gets written
    pub fn with_level(mut self, min_severity: Severity) -> Self {
        self.min_severity = min_severity;
        self
    }

    /// Derive a logger for a sub-component, sharing level and sink
    pub fn with_component(&self, component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            min_severity: self.min_severity,
            sink: self.sink.clone(),
        }
    }

    /// Component name attached to every line
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: Event, fields: &[(&str, &str)]) {
        if severity < self.min_severity {
            return;
        }

        let line = render_line(&self.component, severity, event.as_str(), fields);

        match &self.sink {
            Sink::Console => {
                if severity >= Severity::Error {
                    write_line(&mut io::stderr(), &line);
                } else {
                    write_line(&mut io::stdout(), &line);
                }
            }
            Sink::Memory(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(line);
                }
            }
            Sink::Discard => {}
        }
    }

    /// Log at TRACE level
    pub fn trace(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }

    /// Log at FATAL level
    pub fn fatal(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(Severity::Fatal, event, fields);
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) {
    // One syscall per line; a failed log write is never fatal
    let _ = writer.write_all(line.as_bytes());
    let _ = writer.flush();
}

fn render_line(component: &str, severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(256);

    output.push_str("{\"component\":\"");
    escape_json_string(&mut output, component);
    output.push_str("\",\"event\":\"");
    escape_json_string(&mut output, event);
    output.push_str("\",\"severity\":\"");
    output.push_str(severity.as_str());
    output.push('"');

    let mut sorted_fields: Vec<_> = fields.iter().collect();
    sorted_fields.sort_by_key(|(k, _)| *k);

    for (key, value) in sorted_fields {
        output.push_str(",\"");
        escape_json_string(&mut output, key);
        output.push_str("\":\"");
        escape_json_string(&mut output, value);
        output.push('"');
    }

    output.push_str("}\n");
    output
}

/// Escape special characters for JSON strings
fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("info".parse::<Severity>().unwrap(), Severity::Info);
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn test_log_json_format() {
        let (logger, capture) = Logger::memory("poller");
        logger.info(Event::PollStart, &[]);

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);

        let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed["component"], "poller");
        assert_eq!(parsed["event"], "POLL_START");
        assert_eq!(parsed["severity"], "INFO");
    }

    #[test]
    fn test_fields_sorted_deterministically() {
        let line = render_line("c", Severity::Info, "E", &[("zebra", "1"), ("alpha", "2")]);
        let alpha = line.find("alpha").unwrap();
        let zebra = line.find("zebra").unwrap();
        assert!(alpha < zebra);
    }

    #[test]
    fn test_special_characters_escaped() {
        let line = render_line("c", Severity::Warn, "E", &[("msg", "a \"quoted\"\nline")]);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["msg"], "a \"quoted\"\nline");
    }

    #[test]
    fn test_level_filters_lines() {
        let (logger, capture) = Logger::memory("agent");
        let logger = logger.with_level(Severity::Warn);

        logger.info(Event::PollStart, &[]);
        logger.warn(Event::PollError, &[("error", "boom")]);

        assert_eq!(capture.lines().len(), 1);
        assert!(capture.contains_event(Event::PollError));
        assert!(!capture.contains_event(Event::PollStart));
    }

    #[test]
    fn test_with_component_shares_sink() {
        let (logger, capture) = Logger::memory("root");
        logger.with_component("child").info(Event::WatchStart, &[]);

        assert!(capture.lines()[0].contains("\"component\":\"child\""));
    }
}
