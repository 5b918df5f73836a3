// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Cross-process transport for log records.
//!
//! Frames are a 4-byte big-endian length followed by one JSON-encoded
//! [`LogRecord`]. The host runs an [`IngressServer`] on a Unix socket and
//! forwards every frame, still encoded, onto its shared queue; the listener
//! decodes it. Worker processes log through a [`RemoteQueue`], whose
//! forwarder thread writes frames to that socket.

use crate::logging::{queue, LogRecord, QueueHandle, QueueMessage};
use bytes::Bytes;
use crossbeam_channel::Receiver;
use futures::StreamExt;
use std::io::{self, BufWriter, Write};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};

/// Largest accepted record frame
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// How long open connections may keep draining after shutdown is signalled
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Write one length-prefixed frame
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds {}", payload.len(), MAX_FRAME_LEN),
        ));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)
}

/// Accepts worker connections and feeds their frames into a queue
pub struct IngressServer {
    listener: UnixListener,
    path: PathBuf,
    queue: QueueHandle,
}

impl IngressServer {
    /// Bind the ingress socket, replacing a stale socket file.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>, queue: QueueHandle) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = {
            let std_listener = std::os::unix::net::UnixListener::bind(&path)?;
            std_listener.set_nonblocking(true)?;
            UnixListener::from_std(std_listener)?
        };
        Ok(Self {
            listener,
            path,
            queue,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` flips to true.
    ///
    /// Connections already open get [`DRAIN_GRACE`] to deliver what they
    /// have before being cut off. The socket file is removed on exit.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            connections.spawn(handle_connection(stream, self.queue.clone()));
                        }
                        Err(e) => eprintln!("[Ingress] Accept failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                // Reap finished connections so the set stays small
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            eprintln!(
                "[Ingress] Dropping {} connection(s) still open after shutdown",
                connections.len()
            );
            connections.abort_all();
        }

        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }
}

async fn handle_connection(stream: UnixStream, queue: QueueHandle) {
    let mut frames = FramedRead::new(stream, codec());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(bytes) => {
                queue.send_frame(bytes.freeze());
            }
            Err(e) => {
                // Framing is lost; nothing after this point can be trusted
                eprintln!("[Ingress] Closing connection: {}", e);
                break;
            }
        }
    }
}

/// What a remote queue's forwarder did before it exited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderReport {
    pub sent: u64,
    /// Records that could not be encoded or written
    pub dropped: u64,
}

/// A worker process's view of the host's shared queue.
///
/// Producers get an ordinary [`QueueHandle`]; a forwarder thread drains it
/// onto the ingress socket in order.
pub struct RemoteQueue {
    queue: QueueHandle,
    forwarder: Option<JoinHandle<ForwarderReport>>,
}

impl RemoteQueue {
    pub fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        let stream = StdUnixStream::connect(path)?;
        let (queue, receiver) = queue::channel();
        let forwarder = std::thread::Builder::new()
            .name("logfan-forwarder".to_string())
            .spawn(move || forward(receiver, stream))?;
        Ok(Self {
            queue,
            forwarder: Some(forwarder),
        })
    }

    pub fn handle(&self) -> QueueHandle {
        self.queue.clone()
    }

    /// Flush everything queued so far and close the connection
    pub fn close(mut self) -> ForwarderReport {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ForwarderReport {
        let Some(forwarder) = self.forwarder.take() else {
            return ForwarderReport::default();
        };
        self.queue.send_shutdown();
        forwarder.join().unwrap_or_default()
    }
}

impl Drop for RemoteQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn forward(receiver: Receiver<QueueMessage>, stream: StdUnixStream) -> ForwarderReport {
    let mut report = ForwarderReport::default();
    let mut writer = BufWriter::new(stream);
    let mut broken = false;

    for message in receiver.iter() {
        let payload = match message {
            QueueMessage::Shutdown => break,
            QueueMessage::Frame(frame) => frame,
            QueueMessage::Record(record) => match record.to_frame() {
                Ok(payload) => Bytes::from(payload),
                Err(e) => {
                    eprintln!("[Forwarder] Dropping unencodable record: {}", e);
                    report.dropped += 1;
                    continue;
                }
            },
        };

        if broken {
            report.dropped += 1;
            continue;
        }
        if payload.len() > MAX_FRAME_LEN {
            eprintln!(
                "[Forwarder] Dropping record of {} bytes (limit {})",
                payload.len(),
                MAX_FRAME_LEN
            );
            report.dropped += 1;
            continue;
        }
        match write_frame(&mut writer, &payload) {
            Ok(()) => report.sent += 1,
            Err(e) => {
                eprintln!("[Forwarder] Log connection lost: {}", e);
                report.dropped += 1;
                broken = true;
                continue;
            }
        }
        // Batch while busy, flush as soon as the queue runs dry
        if receiver.is_empty() {
            if let Err(e) = writer.flush() {
                eprintln!("[Forwarder] Log connection lost: {}", e);
                broken = true;
            }
        }
    }

    if !broken {
        let _ = writer.flush();
    }
    report
}

/// Decode helper for tests and tools reading captured frames
pub fn decode_frames(mut data: &[u8]) -> Result<Vec<LogRecord>, io::Error> {
    let mut records = Vec::new();
    while !data.is_empty() {
        if data.len() < 4 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated length"));
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let body = data
            .get(4..4 + len)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated frame"))?;
        records.push(LogRecord::from_frame(body).map_err(io::Error::from)?);
        data = &data[4 + len..];
    }
    Ok(records)
}
