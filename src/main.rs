// SPDX-License-Identifier: Apache-2.0 OR MIT
use anyhow::{Context, Result};
use clap::Parser;
use logfan::logging::Severity;
use logfan::supervisor::{self, RunOptions, DEFAULT_SOCKET_PATH};
use logfan::worker::{self, WorkerOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug, PartialEq)]
enum Command {
    /// Start the listener, run worker processes to completion, then stop
    Run {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
        #[arg(long, default_value_t = 2)]
        workers: usize,
        /// Records per worker thread
        #[arg(long, default_value_t = 100)]
        records: usize,
        #[arg(long, default_value_t = 1)]
        threads: usize,
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: PathBuf,
        #[arg(long, default_value_t = Severity::Trace)]
        worker_level: Severity,
    },
    /// Run only the listener and ingress socket until Ctrl-C
    Listen {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: PathBuf,
    },
    /// Run a worker process (intended to be called by `run`)
    Worker {
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: PathBuf,
        #[arg(long)]
        id: usize,
        #[arg(long, default_value_t = 100)]
        records: usize,
        #[arg(long, default_value_t = 1)]
        threads: usize,
        #[arg(long, default_value_t = Severity::Trace)]
        level: Severity,
        /// Echo records to this process's stderr as well
        #[arg(long)]
        echo: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            config,
            workers,
            records,
            threads,
            socket,
            worker_level,
        } => {
            let summary = supervisor::run(RunOptions {
                config,
                socket,
                workers,
                records,
                threads,
                worker_level,
            })
            .await?;
            if summary.failed_workers > 0 {
                anyhow::bail!("{} worker(s) failed", summary.failed_workers);
            }
        }
        Command::Listen { config, socket } => {
            supervisor::listen(config, socket).await?;
        }
        Command::Worker {
            socket,
            id,
            records,
            threads,
            level,
            echo,
        } => {
            let options = WorkerOptions {
                socket,
                id,
                records,
                threads,
                level,
                echo,
            };
            tokio::task::spawn_blocking(move || worker::run(options))
                .await
                .context("Worker task failed")??;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_parsing() {
        let args = Args::parse_from(["logfan", "listen"]);
        assert_eq!(
            args.command,
            Command::Listen {
                config: PathBuf::from("config.json"),
                socket: PathBuf::from(DEFAULT_SOCKET_PATH),
            }
        );

        let args = Args::parse_from(["logfan", "run", "--workers", "4", "--worker-level", "info"]);
        assert_eq!(
            args.command,
            Command::Run {
                config: PathBuf::from("config.json"),
                workers: 4,
                records: 100,
                threads: 1,
                socket: PathBuf::from(DEFAULT_SOCKET_PATH),
                worker_level: Severity::Info,
            }
        );

        let args = Args::parse_from([
            "logfan",
            "worker",
            "--socket",
            "/tmp/test.sock",
            "--id",
            "7",
            "--threads",
            "3",
            "--level",
            "WARNING",
            "--echo",
        ]);
        assert_eq!(
            args.command,
            Command::Worker {
                socket: PathBuf::from("/tmp/test.sock"),
                id: 7,
                records: 100,
                threads: 3,
                level: Severity::Warning,
                echo: true,
            }
        );
    }

    #[test]
    fn test_unknown_level_rejected() {
        let result = Args::try_parse_from(["logfan", "worker", "--id", "1", "--level", "LOUD"]);
        assert!(result.is_err());
    }
}
