// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Listener lifecycle through the public library API.

use logfan::logging::{ConsoleConfig, FileSinkConfig, ListenerConfig};
use logfan::{log_info, log_trace, FanIn, FanInError, Logger, Registration, Severity};
use std::time::Duration;

fn quiet(files: Vec<FileSinkConfig>) -> ListenerConfig {
    ListenerConfig {
        files,
        console: ConsoleConfig::disabled(),
        history_capacity: None,
    }
}

#[test]
fn test_file_sink_filters_below_its_level() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("info.log");
    let fan_in = FanIn::new();
    let queue = fan_in
        .start(quiet(vec![FileSinkConfig::new(&path)
            .with_level(Severity::Info)
            .with_format("{level} {message}")]))
        .unwrap();

    let logger = Logger::new();
    logger
        .register(queue, Registration::new(Severity::Trace))
        .unwrap();
    log_trace!(logger, "fine detail");
    log_info!(logger, "something happened");

    let report = fan_in.stop().unwrap();
    assert_eq!(report.processed, 2);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().collect::<Vec<_>>(), vec!["INFO something happened"]);
}

#[test]
fn test_history_keeps_most_recent() {
    let fan_in = FanIn::with_history(100);
    let queue = fan_in
        .start(ListenerConfig {
            history_capacity: Some(3),
            ..quiet(Vec::new())
        })
        .unwrap();

    let logger = Logger::new();
    logger.register(queue, Registration::default()).unwrap();
    for n in 1..=5 {
        logger.info(format!("record {}", n));
    }
    fan_in.stop().unwrap();

    let messages: Vec<String> = fan_in.history().into_iter().map(|r| r.message).collect();
    assert_eq!(messages, vec!["record 3", "record 4", "record 5"]);
}

#[test]
fn test_stop_without_start_reports_error() {
    let fan_in = FanIn::new();
    assert!(matches!(fan_in.stop(), Err(FanInError::NotStarted)));
    assert!(matches!(
        fan_in.stop_timeout(Duration::from_millis(10)),
        Err(FanInError::NotStarted)
    ));
}

#[test]
fn test_restart_after_stop() {
    let fan_in = FanIn::with_history(10);
    let logger = Logger::new();

    let queue = fan_in.start(quiet(Vec::new())).unwrap();
    assert!(matches!(
        fan_in.start(quiet(Vec::new())),
        Err(FanInError::AlreadyRunning)
    ));
    logger.register(queue, Registration::default()).unwrap();
    logger.info("first run");
    fan_in.stop().unwrap();
    assert!(!fan_in.is_running());

    let queue = fan_in.start(quiet(Vec::new())).unwrap();
    logger.register(queue, Registration::default()).unwrap();
    logger.info("second run");
    let report = fan_in.stop_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(report.processed, 1);

    let messages: Vec<String> = fan_in.history().into_iter().map(|r| r.message).collect();
    assert_eq!(messages, vec!["first run", "second run"]);
}

#[test]
fn test_subscriber_sees_every_thread() {
    let fan_in = FanIn::new();
    let feed = fan_in.subscribe();
    let queue = fan_in.start(quiet(Vec::new())).unwrap();

    let logger = Logger::new();
    logger.register(queue, Registration::default()).unwrap();
    std::thread::scope(|scope| {
        for t in 0..4 {
            let logger = logger.named(&format!("thread-{}", t));
            scope.spawn(move || {
                for n in 0..50 {
                    logger.info(format!("{}", n));
                }
            });
        }
    });
    fan_in.stop().unwrap();

    let received: Vec<_> = feed.try_iter().collect();
    assert_eq!(received.len(), 200);
    for t in 0..4 {
        let name = format!("thread-{}", t);
        let numbers: Vec<usize> = received
            .iter()
            .filter(|r| r.logger_name == name)
            .map(|r| r.message.parse().unwrap())
            .collect();
        assert_eq!(numbers, (0..50).collect::<Vec<_>>());
    }
}
