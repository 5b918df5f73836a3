// SPDX-License-Identifier: Apache-2.0 OR MIT
// Output sinks and the listener's sink set

use super::entry::{CallSite, LogRecord, RecordKind};
use super::file_sink::FileSink;
use super::format::{Template, TemplateError};
use super::policy::{Compression, Retention, Rotation};
use super::Severity;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Output sink for log records
pub trait LogSink: Send {
    /// Write a record to the sink
    fn write_record(&mut self, record: &LogRecord) -> io::Result<()>;

    /// Flush any buffered output
    fn flush(&mut self) -> io::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open log file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("invalid format for sink '{sink}': {source}")]
    Format {
        sink: String,
        source: TemplateError,
    },
}

/// Where console output goes
#[derive(Clone, Default)]
pub enum ConsoleTarget {
    #[default]
    Stderr,
    Stdout,
    /// In-memory capture, shared by every sink built from this target
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl ConsoleTarget {
    /// A fresh in-memory target
    pub fn buffer() -> Self {
        ConsoleTarget::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    /// Captured text of a `Buffer` target (empty for the real streams)
    pub fn captured(&self) -> String {
        match self {
            ConsoleTarget::Buffer(buf) => {
                let bytes = buf.lock().unwrap_or_else(PoisonError::into_inner);
                String::from_utf8_lossy(&bytes).into_owned()
            }
            _ => String::new(),
        }
    }

    fn writer(&self) -> Box<dyn Write + Send> {
        match self {
            ConsoleTarget::Stderr => Box::new(io::stderr()),
            ConsoleTarget::Stdout => Box::new(io::stdout()),
            ConsoleTarget::Buffer(buf) => Box::new(SharedBuffer(Arc::clone(buf))),
        }
    }
}

impl std::fmt::Debug for ConsoleTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleTarget::Stderr => write!(f, "Stderr"),
            ConsoleTarget::Stdout => write!(f, "Stdout"),
            ConsoleTarget::Buffer(_) => write!(f, "Buffer"),
        }
    }
}

impl PartialEq for ConsoleTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConsoleTarget::Stderr, ConsoleTarget::Stderr) => true,
            (ConsoleTarget::Stdout, ConsoleTarget::Stdout) => true,
            (ConsoleTarget::Buffer(a), ConsoleTarget::Buffer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Console sink settings
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub level: Severity,
    pub colorize: bool,
    /// Template override; `None` uses the process/thread-qualified default
    pub format: Option<String>,
    pub target: ConsoleTarget,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: Severity::Trace,
            colorize: true,
            format: None,
            target: ConsoleTarget::Stderr,
        }
    }
}

impl ConsoleConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: ConsoleTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_colorize(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    fn template(&self, sink: &str) -> Result<Template, SinkError> {
        match &self.format {
            Some(format) => Template::parse(format).map_err(|source| SinkError::Format {
                sink: sink.to_string(),
                source,
            }),
            None => Ok(Template::worker_default()),
        }
    }
}

/// File sink settings
#[derive(Debug, Clone, PartialEq)]
pub struct FileSinkConfig {
    pub name: String,
    pub enabled: bool,
    pub path: PathBuf,
    pub level: Severity,
    pub rotation: Option<Rotation>,
    pub retention: Option<Retention>,
    pub compression: Option<Compression>,
    pub format: Option<String>,
}

impl FileSinkConfig {
    /// Enabled TRACE-level sink without rotation, named after the file stem
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Self {
            name,
            enabled: true,
            path,
            level: Severity::Trace,
            rotation: None,
            retention: None,
            compression: None,
            format: None,
        }
    }

    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn template(&self) -> Result<Template, SinkError> {
        match &self.format {
            Some(format) => Template::parse(format).map_err(|source| SinkError::Format {
                sink: self.name.clone(),
                source,
            }),
            None => Ok(Template::worker_default()),
        }
    }
}

/// Console sink writing one rendered line per record
pub struct ConsoleSink {
    out: Box<dyn Write + Send>,
    template: Template,
    colorize: bool,
}

impl ConsoleSink {
    pub fn new(out: Box<dyn Write + Send>, template: Template, colorize: bool) -> Self {
        Self {
            out,
            template,
            colorize,
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> Result<Self, SinkError> {
        Ok(Self::new(
            config.target.writer(),
            config.template("console")?,
            config.colorize,
        ))
    }
}

impl LogSink for ConsoleSink {
    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        let mut line = self.template.render(record, self.colorize);
        line.push('\n');
        self.out.write_all(line.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// A sink plus the filter deciding which records reach it
pub struct SinkEntry {
    name: String,
    min_level: Severity,
    kind: RecordKind,
    sink: Box<dyn LogSink>,
}

impl SinkEntry {
    pub fn new(
        name: impl Into<String>,
        min_level: Severity,
        kind: RecordKind,
        sink: Box<dyn LogSink>,
    ) -> Self {
        Self {
            name: name.into(),
            min_level,
            kind,
            sink,
        }
    }

    #[inline]
    pub fn accepts(&self, record: &LogRecord) -> bool {
        record.kind == self.kind && record.level.admits(self.min_level)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_level(&self) -> Severity {
        self.min_level
    }
}

/// The listener's sinks for worker records (console + files)
#[derive(Default)]
pub struct SinkSet {
    entries: Vec<SinkEntry>,
}

impl SinkSet {
    /// Build the worker-record sinks.
    ///
    /// Parent directories are created before each file is opened; any
    /// failure aborts the whole build. Disabled file sinks are skipped and
    /// reported to `status` at DEBUG.
    pub fn build(
        files: &[FileSinkConfig],
        console: &ConsoleConfig,
        status: &mut StatusLogger,
    ) -> Result<Self, SinkError> {
        let mut set = SinkSet::default();

        if console.enabled {
            set.push(SinkEntry::new(
                "console",
                console.level,
                RecordKind::Worker,
                Box::new(ConsoleSink::from_config(console)?),
            ));
        }

        for config in files {
            if !config.enabled {
                status.debug(format!("Log file '{}' is disabled, skipping", config.name));
                continue;
            }
            let sink = FileSink::open(config)?;
            status.debug(format!(
                "Log file '{}' -> {} (level {})",
                config.name,
                config.path.display(),
                config.level
            ));
            set.push(SinkEntry::new(
                config.name.clone(),
                config.level,
                RecordKind::Worker,
                Box::new(sink),
            ));
        }

        Ok(set)
    }

    pub fn push(&mut self, entry: SinkEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the active sinks in emit order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(SinkEntry::name).collect()
    }

    /// Write a record to every sink that accepts it.
    ///
    /// A failing sink does not stop delivery to the others; each failure is
    /// handed to `on_error`. Returns the number of sinks written.
    pub fn emit(
        &mut self,
        record: &LogRecord,
        mut on_error: impl FnMut(&str, io::Error),
    ) -> usize {
        let mut delivered = 0;
        for entry in &mut self.entries {
            if !entry.accepts(record) {
                continue;
            }
            match entry.sink.write_record(record) {
                Ok(()) => delivered += 1,
                Err(e) => on_error(&entry.name, e),
            }
        }
        delivered
    }

    pub fn flush(&mut self, mut on_error: impl FnMut(&str, io::Error)) {
        for entry in &mut self.entries {
            if let Err(e) = entry.sink.flush() {
                on_error(&entry.name, e);
            }
        }
    }
}

/// The listener's own logger.
///
/// Console only and accepts listener-kind records only, so status messages
/// never end up in the managed log files.
pub struct StatusLogger {
    entry: Option<SinkEntry>,
}

const STATUS_LOGGER_NAME: &str = "logfan::listener";

impl StatusLogger {
    pub fn new(console: &ConsoleConfig) -> Result<Self, SinkError> {
        let entry = if console.enabled {
            Some(SinkEntry::new(
                "status",
                console.level,
                RecordKind::Listener,
                Box::new(ConsoleSink::new(
                    console.target.writer(),
                    Template::worker_default(),
                    console.colorize,
                )),
            ))
        } else {
            None
        };
        Ok(Self { entry })
    }

    /// A status logger that discards everything
    pub fn silent() -> Self {
        Self { entry: None }
    }

    pub fn log(&mut self, level: Severity, message: impl Into<String>) {
        let Some(entry) = &mut self.entry else {
            return;
        };
        let record = LogRecord::capture(
            RecordKind::Listener,
            level,
            STATUS_LOGGER_NAME,
            CallSite {
                function: "run",
                ..CallSite::unknown()
            },
            message,
        );
        if entry.accepts(&record) {
            // Nowhere left to report a failing stderr
            let _ = entry.sink.write_record(&record);
        }
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn flush(&mut self) {
        if let Some(entry) = &mut self.entry {
            let _ = entry.sink.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(kind: RecordKind, level: Severity, message: &str) -> LogRecord {
        LogRecord::capture(kind, level, "test", CallSite::unknown(), message)
    }

    // Test sink that captures messages
    struct TestSink {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl LogSink for TestSink {
        fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
            self.messages.lock().unwrap().push(record.message.clone());
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingSink {
        calls: Arc<AtomicUsize>,
    }

    impl LogSink for FailingSink {
        fn write_record(&mut self, _record: &LogRecord) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn test_entry(name: &str, min: Severity) -> (SinkEntry, Arc<Mutex<Vec<String>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let entry = SinkEntry::new(
            name,
            min,
            RecordKind::Worker,
            Box::new(TestSink {
                messages: Arc::clone(&messages),
            }),
        );
        (entry, messages)
    }

    #[test]
    fn test_level_filtering_per_sink() {
        let (all, all_messages) = test_entry("all", Severity::Trace);
        let (errors, error_messages) = test_entry("errors", Severity::Error);
        let mut set = SinkSet::default();
        set.push(all);
        set.push(errors);

        for level in Severity::ALL {
            set.emit(&record(RecordKind::Worker, level, level.as_str()), |_, _| {
                panic!("no sink should fail")
            });
        }

        assert_eq!(all_messages.lock().unwrap().len(), 7);
        assert_eq!(
            *error_messages.lock().unwrap(),
            vec!["ERROR".to_string(), "CRITICAL".to_string()]
        );
    }

    #[test]
    fn test_listener_records_never_reach_worker_sinks() {
        let (entry, messages) = test_entry("all", Severity::Trace);
        let mut set = SinkSet::default();
        set.push(entry);

        let delivered = set.emit(
            &record(RecordKind::Listener, Severity::Critical, "internal"),
            |_, _| {},
        );
        assert_eq!(delivered, 0);
        assert!(messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (good, messages) = test_entry("good", Severity::Trace);
        let mut set = SinkSet::default();
        set.push(SinkEntry::new(
            "bad",
            Severity::Trace,
            RecordKind::Worker,
            Box::new(FailingSink {
                calls: Arc::clone(&calls),
            }),
        ));
        set.push(good);

        let mut failures = Vec::new();
        let delivered = set.emit(
            &record(RecordKind::Worker, Severity::Info, "hello"),
            |name, e| failures.push(format!("{}: {}", name, e)),
        );

        assert_eq!(delivered, 1);
        assert_eq!(failures, vec!["bad: disk on fire".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*messages.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_console_sink_renders_lines() {
        let target = ConsoleTarget::buffer();
        let config = ConsoleConfig::default()
            .with_target(target.clone())
            .with_colorize(false)
            .with_format("{level} {message}");
        let mut sink = ConsoleSink::from_config(&config).unwrap();
        sink.write_record(&record(RecordKind::Worker, Severity::Warning, "low disk"))
            .unwrap();
        assert_eq!(target.captured(), "WARNING low disk\n");
    }

    #[test]
    fn test_build_skips_disabled_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            FileSinkConfig::new(dir.path().join("nested/deeper/all.log")),
            FileSinkConfig::new(dir.path().join("off.log")).disabled(),
        ];
        let status_target = ConsoleTarget::buffer();
        let console = ConsoleConfig::default()
            .with_target(status_target.clone())
            .with_colorize(false);
        let mut status = StatusLogger::new(&console).unwrap();

        let set = SinkSet::build(&files, &console, &mut status).unwrap();

        assert_eq!(set.names(), vec!["console", "all"]);
        assert!(dir.path().join("nested/deeper/all.log").exists());
        assert!(!dir.path().join("off.log").exists());
        assert!(status_target.captured().contains("Log file 'off' is disabled, skipping"));
    }

    #[test]
    fn test_build_console_disabled() {
        let console = ConsoleConfig::disabled();
        let mut status = StatusLogger::silent();
        let set = SinkSet::build(&[], &console, &mut status).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_build_rejects_bad_format() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![FileSinkConfig::new(dir.path().join("a.log")).with_format("{nope}")];
        let mut status = StatusLogger::silent();
        let result = SinkSet::build(&files, &ConsoleConfig::disabled(), &mut status);
        assert!(matches!(result, Err(SinkError::Format { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_fails_when_directory_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let files = vec![FileSinkConfig::new(blocker.join("app.log"))];
        let mut status = StatusLogger::silent();
        let result = SinkSet::build(&files, &ConsoleConfig::disabled(), &mut status);
        assert!(matches!(result, Err(SinkError::CreateDir { .. })));
    }

    #[test]
    fn test_status_logger_respects_level_and_kind() {
        let target = ConsoleTarget::buffer();
        let console = ConsoleConfig::default()
            .with_target(target.clone())
            .with_colorize(false)
            .with_level(Severity::Info);
        let mut status = StatusLogger::new(&console).unwrap();

        status.debug("hidden");
        status.info("shown");

        let out = target.captured();
        assert!(!out.contains("hidden"));
        assert!(out.contains("logfan::listener:run"));
        assert!(out.contains("shown"));
    }
}
