// SPDX-License-Identifier: Apache-2.0 OR MIT
//! End-to-end tests for the `logfan` binary.

use super::tests::{cleanup_socket, unique_socket_path_with_prefix};
use anyhow::Result;
use std::path::Path;
use tokio::process::Command as TokioCommand;

fn write_config(dir: &Path) -> Result<std::path::PathBuf> {
    let config = format!(
        r#"{{
            // one file, worker records only distinguishable by logger name
            output: {{ auto_generate: false, manual_dir: "{}" }},
            logging: {{
                level: "TRACE",
                console: {{ enabled: false }},
                files: [
                    {{ name: "workers", filename: "workers.log", level: "INFO", format: "{{name}} | {{message}}" }},
                ],
            }},
        }}"#,
        dir.display()
    );
    let path = dir.join("config.json");
    std::fs::write(&path, config)?;
    Ok(path)
}

/// Two worker processes log 100 records each; the listener's file holds all
/// 200, one intact record per line.
#[tokio::test]
#[cfg_attr(tarpaulin, ignore)]
async fn test_run_two_workers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(dir.path())?;
    let socket = unique_socket_path_with_prefix("cli_run");

    let status = TokioCommand::new(env!("CARGO_BIN_EXE_logfan"))
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--socket")
        .arg(&socket)
        .arg("--workers")
        .arg("2")
        .arg("--records")
        .arg("100")
        .status()
        .await?;
    assert!(status.success());
    assert!(!socket.exists(), "ingress socket should be removed on exit");

    let contents = std::fs::read_to_string(dir.path().join("logs").join("workers.log"))?;
    let records: Vec<&str> = contents
        .lines()
        .filter(|line| line.starts_with("worker-"))
        .collect();
    assert_eq!(records.len(), 200);

    for id in 0..2 {
        let prefix = format!("worker-{} | worker {} thread 0 record ", id, id);
        let numbers: Vec<usize> = records
            .iter()
            .filter_map(|line| line.strip_prefix(prefix.as_str()))
            .map(|n| n.parse().expect("corrupted record line"))
            .collect();
        assert_eq!(numbers, (0..100).collect::<Vec<_>>());
    }

    cleanup_socket(&socket);
    Ok(())
}

/// A worker with no host to talk to exits with an error.
#[tokio::test]
async fn test_worker_without_host_fails() -> Result<()> {
    let socket = unique_socket_path_with_prefix("cli_nohost");
    let output = TokioCommand::new(env!("CARGO_BIN_EXE_logfan"))
        .arg("worker")
        .arg("--socket")
        .arg(&socket)
        .arg("--id")
        .arg("0")
        .output()
        .await?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("could not connect"));
    Ok(())
}

/// An output directory that cannot be created stops `run` before any
/// worker starts.
#[tokio::test]
async fn test_run_fails_on_unwritable_output() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory")?;
    let config = dir.path().join("config.json");
    std::fs::write(
        &config,
        format!(
            r#"{{
                output: {{ auto_generate: false, manual_dir: "{}" }},
                logging: {{ console: {{ enabled: false }} }},
            }}"#,
            blocker.join("out").display()
        ),
    )?;
    let socket = unique_socket_path_with_prefix("cli_badout");

    let output = TokioCommand::new(env!("CARGO_BIN_EXE_logfan"))
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--socket")
        .arg(&socket)
        .output()
        .await?;
    assert!(!output.status.success());
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Spawning worker"));
    assert!(!socket.exists());

    cleanup_socket(&socket);
    Ok(())
}
