// SPDX-License-Identifier: Apache-2.0 OR MIT
// Producer-side logger: registration onto the shared queue

use super::entry::{render_error_chain, CallSite, LogRecord, RecordKind};
use super::queue::QueueHandle;
use super::ringbuffer::HistoryBuffer;
use super::sink::{ConsoleConfig, ConsoleSink, LogSink, SinkError};
use super::Severity;
use std::panic::Location;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Options for [`Logger::register`]
#[derive(Debug, Clone)]
pub struct Registration {
    /// Records below this level are not enqueued
    pub min_level: Severity,
    /// Also print records in this process; `None` keeps the producer silent
    pub console: Option<ConsoleConfig>,
    /// Feed each enqueued record into a history buffer as well
    pub history: Option<Arc<HistoryBuffer>>,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            min_level: Severity::Trace,
            console: None,
            history: None,
        }
    }
}

impl Registration {
    pub fn new(min_level: Severity) -> Self {
        Self {
            min_level,
            ..Self::default()
        }
    }

    pub fn with_console(mut self, console: ConsoleConfig) -> Self {
        self.console = Some(console);
        self
    }

    pub fn with_history(mut self, history: Arc<HistoryBuffer>) -> Self {
        self.history = Some(history);
        self
    }
}

enum ProducerSink {
    Queue {
        queue: QueueHandle,
        min_level: Severity,
        history: Option<Arc<HistoryBuffer>>,
    },
    Console {
        sink: Mutex<ConsoleSink>,
        min_level: Severity,
    },
}

impl ProducerSink {
    fn min_level(&self) -> Severity {
        match self {
            ProducerSink::Queue { min_level, .. } | ProducerSink::Console { min_level, .. } => {
                *min_level
            }
        }
    }

    fn emit(&self, record: &LogRecord) {
        match self {
            ProducerSink::Queue { queue, history, .. } => {
                if let Some(history) = history {
                    history.append(record.clone());
                }
                queue.send_record(record.clone());
            }
            ProducerSink::Console { sink, .. } => {
                let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                // Local echo only; the queued copy is the one that counts
                let _ = sink.write_record(record);
            }
        }
    }
}

/// Logger handle for producers.
///
/// Clones share the same sinks, so registering through any clone
/// reconfigures all of them.
#[derive(Clone, Default)]
pub struct Logger {
    name: Option<Arc<str>>,
    sinks: Arc<RwLock<Vec<ProducerSink>>>,
}

impl Logger {
    /// A logger with no sinks; everything is discarded until registered
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle sharing this logger's sinks under a fixed logger name
    pub fn named(&self, name: &str) -> Self {
        Self {
            name: Some(Arc::from(name)),
            sinks: Arc::clone(&self.sinks),
        }
    }

    /// Route this logger onto a shared queue.
    ///
    /// Every previously installed sink is removed first, so registering
    /// twice leaves exactly one queue sink (plus an optional console sink).
    pub fn register(
        &self,
        queue: QueueHandle,
        registration: Registration,
    ) -> Result<(), SinkError> {
        let mut sinks = vec![ProducerSink::Queue {
            queue,
            min_level: registration.min_level,
            history: registration.history,
        }];
        if let Some(console) = registration.console.filter(|c| c.enabled) {
            sinks.push(ProducerSink::Console {
                sink: Mutex::new(ConsoleSink::from_config(&console)?),
                min_level: console.level,
            });
        }

        *self.sinks.write().unwrap_or_else(PoisonError::into_inner) = sinks;
        Ok(())
    }

    /// Remove every sink
    pub fn clear(&self) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of installed sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether this logger echoes to a console sink
    pub fn has_console(&self) -> bool {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|s| matches!(s, ProducerSink::Console { .. }))
    }

    /// Whether a record at `level` would reach any sink
    pub fn enabled(&self, level: Severity) -> bool {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|s| level.admits(s.min_level()))
    }

    /// Records lost because the queue consumer went away
    pub fn dropped(&self) -> u64 {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| match s {
                ProducerSink::Queue { queue, .. } => queue.dropped(),
                ProducerSink::Console { .. } => 0,
            })
            .sum()
    }

    /// Emit a record with explicit call-site metadata.
    ///
    /// This is what the `log_*!` macros expand to.
    pub fn log_at(
        &self,
        level: Severity,
        site: CallSite,
        message: impl Into<String>,
        exception: Option<String>,
    ) {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        if !sinks.iter().any(|s| level.admits(s.min_level())) {
            return;
        }

        let name = self.name.as_deref().unwrap_or(site.module);
        let mut record = LogRecord::capture(RecordKind::Worker, level, name, site, message);
        record.exception_text = exception;

        for sink in sinks.iter() {
            if level.admits(sink.min_level()) {
                sink.emit(&record);
            }
        }
    }

    #[track_caller]
    pub fn log(&self, level: Severity, message: impl Into<String>) {
        self.log_at(level, caller_site(), message, None);
    }

    #[track_caller]
    pub fn trace(&self, message: impl Into<String>) {
        self.log_at(Severity::Trace, caller_site(), message, None);
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.log_at(Severity::Debug, caller_site(), message, None);
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.log_at(Severity::Info, caller_site(), message, None);
    }

    #[track_caller]
    pub fn success(&self, message: impl Into<String>) {
        self.log_at(Severity::Success, caller_site(), message, None);
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>) {
        self.log_at(Severity::Warning, caller_site(), message, None);
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.log_at(Severity::Error, caller_site(), message, None);
    }

    #[track_caller]
    pub fn critical(&self, message: impl Into<String>) {
        self.log_at(Severity::Critical, caller_site(), message, None);
    }

    /// Log at ERROR with the error and its source chain attached
    #[track_caller]
    pub fn exception(&self, message: impl Into<String>, err: &(dyn std::error::Error + 'static)) {
        self.log_at(
            Severity::Error,
            caller_site(),
            message,
            Some(render_error_chain(err)),
        );
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("sinks", &self.sink_count())
            .finish()
    }
}

/// Logger name for records from an unnamed [`Logger`] method call
pub const UNNAMED_LOGGER: &str = env!("CARGO_PKG_NAME");

#[track_caller]
fn caller_site() -> CallSite {
    let location = Location::caller();
    CallSite {
        file: location.file(),
        line: location.line(),
        module: UNNAMED_LOGGER,
        function: "<unknown>",
    }
}
