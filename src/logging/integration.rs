// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Logging Integration Module
//!
//! [`FanIn`] owns the shared queue, the optional history buffer and the
//! listener thread. The host creates one, starts the listener with its sink
//! configuration, hands [`QueueHandle`]s to producers and stops the listener
//! on the way out.

use super::consumer::{Listener, ListenerReport, Subscribers};
use super::entry::{LogRecord, QueueMessage};
use super::queue::{self, QueueHandle};
use super::ringbuffer::HistoryBuffer;
use super::sink::{ConsoleConfig, FileSinkConfig, SinkError, SinkSet, StatusLogger};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Sink configuration the listener is started with
#[derive(Debug, Clone, Default)]
pub struct ListenerConfig {
    pub files: Vec<FileSinkConfig>,
    pub console: ConsoleConfig,
    /// Resize the history buffer before starting
    pub history_capacity: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum FanInError {
    #[error("log listener is already running")]
    AlreadyRunning,

    #[error("log listener was never started")]
    NotStarted,

    #[error("failed to initialize log sinks: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to spawn log listener thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("log listener did not exit within {0:?}")]
    StopTimeout(Duration),

    #[error("log listener thread panicked")]
    ListenerPanicked,

    #[error("a previous log listener timed out on stop and is still draining")]
    PreviousListenerAlive,
}

struct ListenerHandle {
    thread: JoinHandle<()>,
    done: Receiver<ListenerReport>,
}

/// Shared queue plus listener lifecycle
pub struct FanIn {
    queue: QueueHandle,
    receiver: Receiver<QueueMessage>,
    history: Option<Arc<HistoryBuffer>>,
    subscribers: Subscribers,
    listener: Mutex<Option<ListenerHandle>>,
    /// Listener abandoned by a timed-out stop; it still owns the sentinel
    detached: Mutex<Option<JoinHandle<()>>>,
}

impl FanIn {
    /// A fan-in without replay history
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A fan-in whose listener also records the last `capacity` records
    pub fn with_history(capacity: usize) -> Self {
        Self::build(Some(Arc::new(HistoryBuffer::new(capacity))))
    }

    fn build(history: Option<Arc<HistoryBuffer>>) -> Self {
        let (queue, receiver) = queue::channel();
        Self {
            queue,
            receiver,
            history,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            listener: Mutex::new(None),
            detached: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ListenerHandle>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer handle for the shared queue.
    ///
    /// Valid before the listener starts; records simply wait in the queue.
    pub fn queue(&self) -> QueueHandle {
        self.queue.clone()
    }

    /// Initialize sinks and start the listener thread.
    ///
    /// Sinks are opened here, on the calling thread, so a bad path or
    /// format fails the call instead of killing the listener later.
    pub fn start(&self, config: ListenerConfig) -> Result<QueueHandle, FanInError> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(FanInError::AlreadyRunning);
        }
        self.reap_detached()?;

        if let (Some(history), Some(capacity)) = (&self.history, config.history_capacity) {
            history.resize(capacity);
        }

        let mut status = StatusLogger::new(&config.console)?;
        let sinks = SinkSet::build(&config.files, &config.console, &mut status)?;

        let listener = Listener {
            receiver: self.receiver.clone(),
            sinks,
            status,
            history: self.history.clone(),
            subscribers: Arc::clone(&self.subscribers),
        };
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let thread = std::thread::Builder::new()
            .name("logfan-listener".to_string())
            .spawn(move || {
                let report = listener.run();
                let _ = done_tx.send(report);
            })
            .map_err(FanInError::Spawn)?;

        *slot = Some(ListenerHandle {
            thread,
            done: done_rx,
        });
        Ok(self.queue())
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    /// Send the termination sentinel and wait for the listener to drain
    /// everything queued ahead of it.
    pub fn stop(&self) -> Result<ListenerReport, FanInError> {
        let handle = self.signal_stop()?;
        match handle.done.recv() {
            Ok(report) => {
                let _ = handle.thread.join();
                Ok(report)
            }
            Err(_) => Err(join_failure(handle.thread)),
        }
    }

    /// Like [`stop`](Self::stop) but gives up after `timeout`.
    ///
    /// On timeout the listener thread is detached and left to finish on
    /// its own; [`start`](Self::start) is refused until it has.
    pub fn stop_timeout(&self, timeout: Duration) -> Result<ListenerReport, FanInError> {
        let handle = self.signal_stop()?;
        match handle.done.recv_timeout(timeout) {
            Ok(report) => {
                let _ = handle.thread.join();
                Ok(report)
            }
            Err(RecvTimeoutError::Timeout) => {
                *self.detached_slot() = Some(handle.thread);
                Err(FanInError::StopTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(join_failure(handle.thread)),
        }
    }

    fn detached_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.detached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A second consumer must not start until the abandoned one has taken
    /// its sentinel off the queue.
    fn reap_detached(&self) -> Result<(), FanInError> {
        let mut detached = self.detached_slot();
        match detached.take() {
            Some(thread) if !thread.is_finished() => {
                *detached = Some(thread);
                Err(FanInError::PreviousListenerAlive)
            }
            Some(thread) => {
                let _ = thread.join();
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn signal_stop(&self) -> Result<ListenerHandle, FanInError> {
        let handle = self.slot().take().ok_or(FanInError::NotStarted)?;
        // The receiver lives in self, so the queue cannot be disconnected
        self.queue.send_shutdown();
        Ok(handle)
    }

    /// The history buffer, if this fan-in keeps one
    pub fn history_buffer(&self) -> Option<Arc<HistoryBuffer>> {
        self.history.clone()
    }

    /// Snapshot of recent records (empty without history)
    pub fn history(&self) -> Vec<LogRecord> {
        self.history
            .as_ref()
            .map(|h| h.snapshot())
            .unwrap_or_default()
    }

    /// Clear the history buffer
    pub fn clear_history(&self) {
        if let Some(history) = &self.history {
            history.clear();
        }
    }

    /// Live feed of every record the listener writes from now on
    pub fn subscribe(&self) -> Receiver<LogRecord> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}

impl Default for FanIn {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FanIn {
    fn drop(&mut self) {
        // Never leave a listener blocked on a queue nobody can reach
        if self.is_running() {
            let _ = self.stop_timeout(Duration::from_secs(5));
        }
    }
}

fn join_failure(thread: JoinHandle<()>) -> FanInError {
    // The report channel only disconnects early if the thread died
    let _ = thread.join();
    FanInError::ListenerPanicked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::sink::ConsoleTarget;
    use crate::logging::{CallSite, Logger, RecordKind, Registration, Severity};
    use std::fs;

    fn quiet() -> ConsoleConfig {
        ConsoleConfig::disabled()
    }

    #[test]
    fn test_stop_without_start() {
        let fan_in = FanIn::new();
        assert!(matches!(fan_in.stop(), Err(FanInError::NotStarted)));
    }

    #[test]
    fn test_start_twice_fails() {
        let fan_in = FanIn::new();
        fan_in
            .start(ListenerConfig {
                console: quiet(),
                ..Default::default()
            })
            .unwrap();
        let second = fan_in.start(ListenerConfig {
            console: quiet(),
            ..Default::default()
        });
        assert!(matches!(second, Err(FanInError::AlreadyRunning)));
        fan_in.stop().unwrap();
    }

    #[test]
    fn test_sink_failure_surfaces_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let fan_in = FanIn::new();
        let result = fan_in.start(ListenerConfig {
            files: vec![FileSinkConfig::new(blocker.join("sub/app.log"))],
            console: quiet(),
            history_capacity: None,
        });
        assert!(matches!(result, Err(FanInError::Sink(_))));
        assert!(!fan_in.is_running());
    }

    #[test]
    fn test_records_queued_before_stop_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.log");
        let fan_in = FanIn::new();
        let queue = fan_in
            .start(ListenerConfig {
                files: vec![FileSinkConfig::new(&path).with_format("{message}")],
                console: quiet(),
                history_capacity: None,
            })
            .unwrap();

        let logger = Logger::new();
        logger.register(queue, Registration::default()).unwrap();
        for i in 0..100 {
            logger.info(format!("line {}", i));
        }

        let report = fan_in.stop().unwrap();
        assert_eq!(report.processed, 100);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 100);
        assert_eq!(lines[0], "line 0");
        assert_eq!(lines[99], "line 99");
    }

    #[test]
    fn test_history_and_subscription() {
        let fan_in = FanIn::with_history(3);
        let live = fan_in.subscribe();
        let queue = fan_in
            .start(ListenerConfig {
                console: quiet(),
                ..Default::default()
            })
            .unwrap();

        let logger = Logger::new();
        logger.register(queue, Registration::default()).unwrap();
        for i in 0..5 {
            logger.info(i.to_string());
        }
        fan_in.stop().unwrap();

        let history: Vec<String> = fan_in.history().into_iter().map(|r| r.message).collect();
        assert_eq!(history, vec!["2", "3", "4"]);
        assert_eq!(live.try_iter().count(), 5);

        fan_in.clear_history();
        assert!(fan_in.history().is_empty());
    }

    #[test]
    fn test_history_capacity_from_config() {
        let fan_in = FanIn::with_history(100);
        fan_in
            .start(ListenerConfig {
                console: quiet(),
                history_capacity: Some(7),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(fan_in.history_buffer().unwrap().capacity(), 7);
        fan_in.stop().unwrap();
    }

    #[test]
    fn test_restart_after_stop() {
        let fan_in = FanIn::new();
        let console = ConsoleConfig::default()
            .with_target(ConsoleTarget::buffer())
            .with_colorize(false);
        for _ in 0..2 {
            let queue = fan_in
                .start(ListenerConfig {
                    console: console.clone(),
                    ..Default::default()
                })
                .unwrap();
            let logger = Logger::new();
            logger.register(queue, Registration::default()).unwrap();
            logger.info("hello");
            assert_eq!(fan_in.stop().unwrap().processed, 1);
        }
    }

    #[test]
    fn test_status_lines_stay_off_file_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.log");
        let console_target = ConsoleTarget::buffer();
        let fan_in = FanIn::new();
        let queue = fan_in
            .start(ListenerConfig {
                files: vec![FileSinkConfig::new(&path)],
                console: ConsoleConfig::default()
                    .with_target(console_target.clone())
                    .with_colorize(false),
                history_capacity: None,
            })
            .unwrap();
        let logger = Logger::new();
        logger
            .register(queue, Registration::new(Severity::Info))
            .unwrap();
        logger.info("worker says hi");
        fan_in.stop().unwrap();

        let file = fs::read_to_string(&path).unwrap();
        assert!(file.contains("worker says hi"));
        assert!(!file.contains("log listener"));
        assert!(!file.contains("Log listener started"));

        let console = console_target.captured();
        assert!(console.contains("worker says hi"));
        assert!(console.contains("Log listener started"));
    }

    #[test]
    fn test_restart_waits_for_timed_out_listener() {
        let fan_in = FanIn::new();
        let _live = fan_in.subscribe();
        let config = || ListenerConfig {
            console: quiet(),
            ..Default::default()
        };

        let queue = fan_in.start(config()).unwrap();
        // Hold the subscriber list so the listener stalls publishing
        let stall = fan_in.subscribers.lock().unwrap();
        queue.send_record(LogRecord::capture(
            RecordKind::Worker,
            Severity::Info,
            "test",
            CallSite::unknown(),
            "stuck",
        ));
        assert!(matches!(
            fan_in.stop_timeout(Duration::from_millis(50)),
            Err(FanInError::StopTimeout(_))
        ));
        assert!(matches!(
            fan_in.start(config()),
            Err(FanInError::PreviousListenerAlive)
        ));
        drop(stall);

        let mut restarted = None;
        for _ in 0..200 {
            match fan_in.start(config()) {
                Ok(queue) => {
                    restarted = Some(queue);
                    break;
                }
                Err(FanInError::PreviousListenerAlive) => {
                    std::thread::sleep(Duration::from_millis(10))
                }
                Err(e) => panic!("unexpected {:?}", e),
            }
        }
        let queue = restarted.expect("old listener never finished");

        let logger = Logger::new();
        logger.register(queue, Registration::default()).unwrap();
        logger.info("fresh");
        // The new listener must not have consumed the old sentinel
        assert!(fan_in.is_running());
        let report = fan_in.stop_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.processed, 1);
    }

    #[test]
    fn test_stop_timeout_returns_report() {
        let fan_in = FanIn::new();
        fan_in
            .start(ListenerConfig {
                console: quiet(),
                ..Default::default()
            })
            .unwrap();
        let report = fan_in.stop_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report, ListenerReport::default());
        assert!(matches!(
            fan_in.stop_timeout(Duration::from_millis(1)),
            Err(FanInError::NotStarted)
        ));
    }
}
