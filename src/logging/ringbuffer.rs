// SPDX-License-Identifier: Apache-2.0 OR MIT
// Bounded history of recent records for GUI replay
//
// A single mutex guards the deque. It is held only for in-memory work and
// never across a sink write or any other I/O.

use super::entry::LogRecord;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of records kept for replay
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

struct Inner {
    records: VecDeque<LogRecord>,
    capacity: usize,
}

/// Fixed-capacity ring of log records, oldest evicted first.
pub struct HistoryBuffer {
    inner: Mutex<Inner>,
}

impl HistoryBuffer {
    /// Create an empty buffer holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
                capacity,
            }),
        }
    }

    // Records are plain data, so a panic while holding the lock cannot leave
    // them half-written; keep serving after poisoning.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record, evicting the oldest one when full
    pub fn append(&self, record: LogRecord) {
        let mut inner = self.lock();
        if inner.capacity == 0 {
            return;
        }
        if inner.records.len() == inner.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record);
    }

    /// Copy of the buffered records in arrival order
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.lock().records.iter().cloned().collect()
    }

    /// Drop every buffered record
    pub fn clear(&self) {
        self.lock().records.clear();
    }

    /// Change the capacity, keeping the most recent `min(len, new_capacity)` records
    pub fn resize(&self, new_capacity: usize) {
        let mut inner = self.lock();
        let len = inner.records.len();
        if len > new_capacity {
            inner.records.drain(..len - new_capacity);
        }
        inner.capacity = new_capacity;
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl std::fmt::Debug for HistoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("HistoryBuffer")
            .field("len", &inner.records.len())
            .field("capacity", &inner.capacity)
            .finish()
    }
}
