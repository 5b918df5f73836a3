// SPDX-License-Identifier: Apache-2.0 OR MIT
// Listener: the single consumer of the shared queue

use super::entry::{LogRecord, QueueMessage};
use super::ringbuffer::HistoryBuffer;
use super::sink::{SinkSet, StatusLogger};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

/// Live record subscribers (GUI transcripts and the like)
pub(crate) type Subscribers = Arc<Mutex<Vec<Sender<LogRecord>>>>;

/// What a listener did before it exited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerReport {
    /// Records written to the sinks
    pub processed: u64,
    /// Frames that could not be decoded
    pub rejected: u64,
    /// Individual sink write failures
    pub sink_errors: u64,
}

pub(crate) struct Listener {
    pub(crate) receiver: Receiver<QueueMessage>,
    pub(crate) sinks: SinkSet,
    pub(crate) status: StatusLogger,
    pub(crate) history: Option<Arc<HistoryBuffer>>,
    pub(crate) subscribers: Subscribers,
}

impl Listener {
    /// Consume the queue until the termination sentinel arrives.
    ///
    /// Processing is strictly sequential, so records leave in the order
    /// they were dequeued.
    pub(crate) fn run(mut self) -> ListenerReport {
        let mut report = ListenerReport::default();
        self.status.info(format!(
            "Log listener started in process {} ({} sinks)",
            std::process::id(),
            self.sinks.len()
        ));

        loop {
            let message = match self.receiver.recv() {
                Ok(message) => message,
                Err(_) => {
                    self.status
                        .warning("Log queue closed without a termination signal");
                    break;
                }
            };

            match message {
                QueueMessage::Shutdown => {
                    self.status
                        .info("Termination signal received, log listener exiting");
                    break;
                }
                QueueMessage::Record(record) => self.process(record, &mut report),
                QueueMessage::Frame(frame) => match LogRecord::from_frame(&frame) {
                    Ok(record) => self.process(record, &mut report),
                    Err(e) => {
                        report.rejected += 1;
                        self.status
                            .error(format!("Discarding undecodable log record: {}", e));
                    }
                },
            }
        }

        let status = &mut self.status;
        let sink_errors = &mut report.sink_errors;
        self.sinks.flush(|name, e| {
            *sink_errors += 1;
            status.error(format!("Failed to flush sink '{}': {}", name, e));
        });
        self.status.flush();
        report
    }

    fn process(&mut self, record: LogRecord, report: &mut ListenerReport) {
        if let Some(history) = &self.history {
            history.append(record.clone());
        }
        self.publish(&record);

        // One bad record (or a panicking sink) must not end the listener
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut failures = Vec::new();
            self.sinks
                .emit(&record, |name, e| failures.push(format!("{}: {}", name, e)));
            failures
        }));

        match outcome {
            Ok(failures) => {
                for failure in failures {
                    report.sink_errors += 1;
                    self.status
                        .error(format!("Error writing log record to sink {}", failure));
                }
                report.processed += 1;
            }
            Err(_) => {
                report.sink_errors += 1;
                self.status.error(format!(
                    "Sink panicked while writing record from P{}/T{}",
                    record.process_id, record.thread_id
                ));
            }
        }
    }

    fn publish(&self, record: &LogRecord) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribers.is_empty() {
            return;
        }
        // Receivers that hung up are forgotten
        subscribers.retain(|tx| tx.send(record.clone()).is_ok());
    }
}
