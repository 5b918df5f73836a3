// SPDX-License-Identifier: Apache-2.0 OR MIT
// Host process: owns the fan-in, the ingress socket and the worker processes

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ConfigService;
use crate::ipc::IngressServer;
use crate::logging::{FanIn, ListenerReport, Logger, Registration, Severity};
use crate::{log_error, log_info, log_success};

/// Default ingress socket
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/logfan.sock";

/// A running fan-in reachable by other processes.
pub struct Host {
    fan_in: Arc<FanIn>,
    logger: Logger,
    logs_dir: PathBuf,
    socket_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    ingress: JoinHandle<std::io::Result<()>>,
}

impl Host {
    /// Prepare output directories, start the listener and bind the ingress
    /// socket. Must be called from within a tokio runtime.
    pub async fn start(mut config: ConfigService, socket_path: &Path) -> Result<Self> {
        let paths = config
            .output_paths()
            .context("Failed to prepare output directories")?;
        let listener_config = config
            .listener_config(&paths.logs)
            .context("Invalid log sink configuration")?;

        let fan_in = Arc::new(FanIn::with_history(config.history_capacity()));
        let queue = fan_in
            .start(listener_config)
            .context("Failed to start log listener")?;

        let logger = Logger::new().named("logfan::host");
        logger
            .register(queue.clone(), Registration::new(config.level()))
            .context("Failed to register host logger")?;
        config.replay_notices(&logger);
        log_info!(logger, "Logs directory: {}", paths.logs.display());

        let server = IngressServer::bind(socket_path, queue)
            .with_context(|| format!("Failed to bind ingress socket {}", socket_path.display()))?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingress = tokio::spawn(server.run(shutdown_rx));
        log_info!(logger, "Ingress socket listening on {}", socket_path.display());

        Ok(Self {
            fan_in,
            logger,
            logs_dir: paths.logs,
            socket_path: socket_path.to_path_buf(),
            shutdown_tx,
            ingress,
        })
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn fan_in(&self) -> &FanIn {
        &self.fan_in
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Close the ingress (letting open connections drain), then stop the
    /// listener once everything received is queued ahead of the sentinel.
    pub async fn shutdown(self) -> Result<ListenerReport> {
        let _ = self.shutdown_tx.send(true);
        self.ingress
            .await
            .context("Ingress task failed")?
            .context("Ingress server failed")?;

        log_info!(self.logger, "Ingress closed, stopping log listener");
        let fan_in = Arc::clone(&self.fan_in);
        let report = tokio::task::spawn_blocking(move || fan_in.stop())
            .await
            .context("Listener stop task failed")??;
        Ok(report)
    }
}

/// Options for [`run`]
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub socket: PathBuf,
    pub workers: usize,
    pub records: usize,
    pub threads: usize,
    pub worker_level: Severity,
}

/// Result of a [`run`]
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: ListenerReport,
    pub failed_workers: usize,
    pub logs_dir: PathBuf,
}

fn get_production_base_command() -> Result<Command> {
    let current_exe = std::env::current_exe().context("Failed to get current executable path")?;
    Ok(Command::new(current_exe))
}

pub fn spawn_worker(options: &RunOptions, id: usize) -> Result<Child> {
    println!("[Host] Spawning worker {}.", id);
    let mut command = get_production_base_command()?;
    command
        .arg("worker")
        .arg("--socket")
        .arg(&options.socket)
        .arg("--id")
        .arg(id.to_string())
        .arg("--records")
        .arg(options.records.to_string())
        .arg("--threads")
        .arg(options.threads.to_string())
        .arg("--level")
        .arg(options.worker_level.as_str())
        .stdin(Stdio::null());
    command
        .spawn()
        .with_context(|| format!("Failed to spawn worker {}", id))
}

/// Start a host, run `workers` worker processes to completion, shut down
pub async fn run(options: RunOptions) -> Result<RunSummary> {
    println!("[Host] Starting.");
    let host = Host::start(ConfigService::load(&options.config), &options.socket).await?;

    let mut children = Vec::with_capacity(options.workers);
    for id in 0..options.workers {
        match spawn_worker(&options, id) {
            Ok(child) => children.push((id, child)),
            Err(e) => log_error!(host.logger(), "{:#}", e),
        }
    }
    let mut failed_workers = options.workers - children.len();

    for (id, mut child) in children {
        match child.wait().await {
            Ok(status) if status.success() => {
                log_success!(host.logger(), "Worker {} finished", id);
            }
            Ok(status) => {
                failed_workers += 1;
                log_error!(host.logger(), "Worker {} failed (status: {})", id, status);
            }
            Err(e) => {
                failed_workers += 1;
                log_error!(host.logger(), "Could not wait for worker {}: {}", id, e);
            }
        }
    }

    let logs_dir = host.logs_dir().to_path_buf();
    let report = host.shutdown().await?;
    println!(
        "[Host] Listener processed {} records ({} rejected, {} sink errors). Logs in {}.",
        report.processed,
        report.rejected,
        report.sink_errors,
        logs_dir.display()
    );

    Ok(RunSummary {
        report,
        failed_workers,
        logs_dir,
    })
}

/// Run only the listener and ingress socket until Ctrl-C
pub async fn listen(config: PathBuf, socket: PathBuf) -> Result<ListenerReport> {
    println!("[Host] Starting listener.");
    let host = Host::start(ConfigService::load(&config), &socket).await?;
    println!(
        "[Host] Accepting records on {}. Press Ctrl-C to stop.",
        host.socket_path().display()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;
    println!("[Host] Shutting down.");
    host.shutdown().await
}
