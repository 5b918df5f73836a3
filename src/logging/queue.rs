// SPDX-License-Identifier: Apache-2.0 OR MIT
// Shared log queue
//
// Multi-producer, single-consumer and unbounded: producers never block, and
// records from one producer keep their order.

use super::entry::{LogRecord, QueueMessage};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Create a fresh queue
pub fn channel() -> (QueueHandle, Receiver<QueueMessage>) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (
        QueueHandle {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        receiver,
    )
}

/// Producer end of the shared queue.
///
/// Cheap to clone; every clone feeds the same consumer and shares the
/// dropped-record counter.
#[derive(Clone)]
pub struct QueueHandle {
    sender: Sender<QueueMessage>,
    dropped: Arc<AtomicU64>,
}

impl QueueHandle {
    /// Enqueue a record. Returns false (and counts it) if the consumer is gone.
    pub fn send_record(&self, record: LogRecord) -> bool {
        self.send(QueueMessage::Record(record))
    }

    /// Enqueue an encoded record received from another process
    pub fn send_frame(&self, frame: Bytes) -> bool {
        self.send(QueueMessage::Frame(frame))
    }

    pub(crate) fn send_shutdown(&self) -> bool {
        self.sender.send(QueueMessage::Shutdown).is_ok()
    }

    fn send(&self, message: QueueMessage) -> bool {
        match self.sender.send(message) {
            Ok(()) => true,
            Err(_) => {
                self.record_dropped();
                false
            }
        }
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that could not be delivered
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages waiting for the consumer
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("pending", &self.pending())
            .field("dropped", &self.dropped())
            .finish()
    }
}
