// SPDX-License-Identifier: Apache-2.0 OR MIT
// Multi-process log fan-in
//
// Producers (threads here, worker processes over the ingress socket) push
// records onto one shared queue; a single listener thread drains it into the
// console and file sinks, feeds the history buffer and live subscribers.

mod consumer;
mod entry;
mod file_sink;
mod format;
pub mod integration;
mod logger;
#[macro_use]
mod macros;
mod policy;
pub mod queue;
mod ringbuffer;
mod severity;
mod sink;
mod transcript;

// Public exports
pub use consumer::ListenerReport;
pub use entry::{render_error_chain, CallSite, LogRecord, QueueMessage, RecordKind};
pub use file_sink::FileSink;
pub use format::{Template, TemplateError, DEFAULT_TIME_FORMAT, WORKER_FORMAT};
pub use integration::{FanIn, FanInError, ListenerConfig};
pub use logger::{Logger, Registration, UNNAMED_LOGGER};
pub use policy::{Compression, PolicyError, Retention, Rotation};
pub use queue::QueueHandle;
pub use ringbuffer::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
pub use severity::{Severity, UnknownSeverity};
pub use sink::{
    ConsoleConfig, ConsoleSink, ConsoleTarget, FileSinkConfig, LogSink, SinkEntry, SinkError,
    SinkSet, StatusLogger,
};
pub use transcript::Transcript;
