// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log record structure passed through the shared queue

use super::Severity;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Origin tag of a record.
///
/// Worker records are everything produced through a registered logger.
/// Listener records are the listener's own status messages; they go to the
/// console only and never reach the file sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Worker,
    Listener,
}

/// Call-site metadata captured by the logging macros
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub module: &'static str,
    pub function: &'static str,
}

impl CallSite {
    /// Call site for records that have no meaningful source location
    pub const fn unknown() -> Self {
        Self {
            file: "<unknown>",
            line: 0,
            module: "<unknown>",
            function: "<unknown>",
        }
    }
}

/// A single log record.
///
/// Only plain data: records cross process boundaries as JSON frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub message: String,
    pub level: Severity,
    pub process_id: u32,
    pub thread_id: u64,
    /// RFC 3339 timestamp assigned where the record was created
    pub timestamp: String,
    pub source_file: String,
    pub function_name: String,
    pub line_number: u32,
    pub logger_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_text: Option<String>,
}

impl LogRecord {
    /// Capture a record for the calling process and thread
    pub fn capture(
        kind: RecordKind,
        level: Severity,
        logger_name: &str,
        site: CallSite,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            level,
            process_id: std::process::id(),
            thread_id: current_thread_id(),
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            source_file: file_name(site.file).to_string(),
            function_name: short_function_name(site.function).to_string(),
            line_number: site.line,
            logger_name: logger_name.to_string(),
            exception_text: None,
        }
    }

    /// Attach pre-rendered error text
    pub fn with_exception(mut self, text: impl Into<String>) -> Self {
        self.exception_text = Some(text.into());
        self
    }

    /// Parse the origin timestamp (None if a remote peer sent garbage)
    pub fn time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }

    /// Encode as a JSON frame payload
    pub fn to_frame(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode a JSON frame payload
    pub fn from_frame(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Message text with the exception appended, the way it is re-emitted
    pub fn full_message(&self) -> String {
        match &self.exception_text {
            Some(exc) => format!("{}\n{}", self.message, exc),
            None => self.message.clone(),
        }
    }
}

/// Messages carried by the shared queue
#[derive(Debug, Clone)]
pub enum QueueMessage {
    /// A record from a producer in this process
    Record(LogRecord),
    /// An undecoded frame received from another process
    Frame(Bytes),
    /// Termination sentinel: the listener exits after processing it
    Shutdown,
}

/// Render an error and its source chain into exception text
pub fn render_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = format!("Error: {}", err);
    let mut source = err.source();
    if source.is_some() {
        text.push_str("\n\nCaused by:");
    }
    let mut index = 0;
    while let Some(cause) = source {
        text.push_str(&format!("\n    {}: {}", index, cause));
        index += 1;
        source = cause.source();
    }
    text
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// Strip the module path from a `type_name`-style function path
fn short_function_name(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Get the kernel thread id of the caller
pub(crate) fn current_thread_id() -> u64 {
    #[cfg(target_os = "linux")]
    {
        unsafe { libc::gettid() as u64 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> CallSite {
        CallSite {
            file: "src/worker/ingest.rs",
            line: 42,
            module: "demo::worker::ingest",
            function: "demo::worker::ingest::load_batch",
        }
    }

    #[test]
    fn test_capture_fills_origin_fields() {
        let record = LogRecord::capture(
            RecordKind::Worker,
            Severity::Info,
            "demo::worker",
            site(),
            "batch loaded",
        );
        assert_eq!(record.kind, RecordKind::Worker);
        assert_eq!(record.process_id, std::process::id());
        assert_eq!(record.thread_id, current_thread_id());
        assert_eq!(record.source_file, "ingest.rs");
        assert_eq!(record.function_name, "load_batch");
        assert_eq!(record.line_number, 42);
        assert_eq!(record.logger_name, "demo::worker");
        assert!(record.time().is_some());
        assert!(record.exception_text.is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let record = LogRecord::capture(
            RecordKind::Worker,
            Severity::Warning,
            "demo",
            site(),
            "disk almost full",
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "worker");
        assert_eq!(value["level"], "WARNING");
        assert_eq!(value["line_number"], 42);
        // Absent exception is not serialized at all
        assert!(value.get("exception_text").is_none());
    }

    #[test]
    fn test_unknown_level_is_rejected_on_decode() {
        let record = LogRecord::capture(RecordKind::Worker, Severity::Info, "demo", site(), "x");
        let mut value = serde_json::to_value(&record).unwrap();
        value["level"] = "VERBOSE".into();
        assert!(serde_json::from_value::<LogRecord>(value).is_err());
    }

    #[test]
    fn test_full_message_appends_exception() {
        let record = LogRecord::capture(RecordKind::Worker, Severity::Error, "demo", site(), "failed")
            .with_exception("Error: boom");
        assert_eq!(record.full_message(), "failed\nError: boom");
    }

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "could not open settings")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_render_error_chain() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"));
        let text = render_error_chain(&err);
        assert_eq!(
            text,
            "Error: could not open settings\n\nCaused by:\n    0: no such file"
        );
    }

    #[test]
    fn test_render_single_error() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "plain");
        assert_eq!(render_error_chain(&err), "Error: plain");
    }
}
