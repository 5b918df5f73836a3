// SPDX-License-Identifier: Apache-2.0 OR MIT
// Worker process: registers onto the host's queue over the ingress socket
// and produces records from one or more threads

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::ipc::{ForwarderReport, RemoteQueue};
use crate::logging::{ConsoleConfig, Logger, Registration, Severity};

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub socket: PathBuf,
    pub id: usize,
    /// Records per thread
    pub records: usize,
    pub threads: usize,
    pub level: Severity,
    /// Also print records to this process's stderr
    pub echo: bool,
}

impl WorkerOptions {
    pub fn registration(&self) -> Registration {
        let registration = Registration::new(self.level);
        if self.echo {
            registration.with_console(ConsoleConfig::default().with_level(self.level))
        } else {
            registration
        }
    }
}

/// Produce `threads * records` INFO records on the host's queue.
///
/// Blocks until every record has been handed to the socket.
pub fn run(options: WorkerOptions) -> Result<ForwarderReport> {
    println!("[Worker {}] Connecting to {}.", options.id, options.socket.display());
    let remote = RemoteQueue::connect(&options.socket).with_context(|| {
        format!(
            "Worker {} could not connect to {}",
            options.id,
            options.socket.display()
        )
    })?;

    let logger = Logger::new().named(&format!("worker-{}", options.id));
    logger
        .register(remote.handle(), options.registration())
        .context("Failed to register worker logger")?;

    let threads = options.threads.max(1);
    std::thread::scope(|scope| {
        for t in 0..threads {
            let logger = logger.clone();
            let options = &options;
            scope.spawn(move || produce(&logger, options.id, t, options.records));
        }
    });

    // Detach the logger before the connection goes away
    logger.clear();
    let report = remote.close();
    println!(
        "[Worker {}] Sent {} records ({} dropped).",
        options.id, report.sent, report.dropped
    );
    if report.dropped > 0 {
        anyhow::bail!("Worker {} dropped {} records", options.id, report.dropped);
    }
    Ok(report)
}

fn produce(logger: &Logger, id: usize, thread: usize, records: usize) {
    for n in 0..records {
        logger.info(format!("worker {} thread {} record {}", id, thread, n));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::IngressServer;
    use crate::logging::{ConsoleTarget, FanIn, ListenerConfig};
    use tokio::sync::watch;

    fn options(socket: PathBuf) -> WorkerOptions {
        WorkerOptions {
            socket,
            id: 3,
            records: 25,
            threads: 4,
            level: Severity::Info,
            echo: false,
        }
    }

    #[test]
    fn test_registration_echo() {
        let socket = PathBuf::from("/tmp/unused.sock");
        let quiet = options(socket.clone()).registration();
        assert!(quiet.console.is_none());

        let loud = WorkerOptions {
            echo: true,
            ..options(socket)
        }
        .registration();
        let console = loud.console.unwrap();
        assert_eq!(console.level, Severity::Info);
        assert_eq!(console.target, ConsoleTarget::Stderr);
    }

    #[test]
    fn test_run_without_host_fails() {
        let socket =
            std::env::temp_dir().join(format!("logfan_nohost_{}.sock", uuid::Uuid::new_v4()));
        assert!(run(options(socket)).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_threads_reach_history() {
        let socket =
            std::env::temp_dir().join(format!("logfan_worker_{}.sock", uuid::Uuid::new_v4()));
        let fan_in = FanIn::with_history(1000);
        let queue = fan_in
            .start(ListenerConfig {
                files: Vec::new(),
                console: ConsoleConfig::disabled(),
                ..ListenerConfig::default()
            })
            .unwrap();

        let server = IngressServer::bind(&socket, queue).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingress = tokio::spawn(server.run(shutdown_rx));

        let opts = options(socket.clone());
        let report = tokio::task::spawn_blocking(move || run(opts))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.sent, 100);

        shutdown_tx.send(true).unwrap();
        ingress.await.unwrap().unwrap();
        let listener = fan_in.stop().unwrap();
        assert_eq!(listener.processed, 100);

        let history = fan_in.history();
        assert_eq!(history.len(), 100);
        for t in 0..4 {
            let numbers: Vec<usize> = history
                .iter()
                .filter_map(|r| {
                    r.message
                        .strip_prefix(&format!("worker 3 thread {} record ", t))
                        .map(|n| n.parse().unwrap())
                })
                .collect();
            assert_eq!(numbers, (0..25).collect::<Vec<_>>());
        }
        assert!(history.iter().all(|r| r.logger_name == "worker-3"));
    }
}
