// SPDX-License-Identifier: Apache-2.0 OR MIT
// Display-side log transcript: history replay plus live records, filtered
// by a minimum level.

use super::entry::LogRecord;
use super::format::Template;
use super::Severity;
use crossbeam_channel::Receiver;
use std::collections::VecDeque;

/// Records a log view shows, bounded and level-filtered
#[derive(Debug, Clone)]
pub struct Transcript {
    entries: VecDeque<LogRecord>,
    max_entries: usize,
    filter: Severity,
}

impl Transcript {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
            filter: Severity::Trace,
        }
    }

    /// Replace the contents with a history snapshot (oldest first)
    pub fn load_history(&mut self, records: Vec<LogRecord>) {
        self.entries.clear();
        for record in records {
            self.append(record);
        }
    }

    /// Add one live record, dropping the oldest past the bound
    pub fn append(&mut self, record: LogRecord) {
        if self.max_entries == 0 {
            return;
        }
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Pull everything currently waiting on a live subscription
    pub fn drain_live(&mut self, live: &Receiver<LogRecord>) -> usize {
        let mut count = 0;
        for record in live.try_iter() {
            self.append(record);
            count += 1;
        }
        count
    }

    pub fn set_filter(&mut self, level: Severity) {
        self.filter = level;
    }

    pub fn filter(&self) -> Severity {
        self.filter
    }

    /// Records at or above the filter level, oldest first
    pub fn visible(&self) -> impl Iterator<Item = &LogRecord> + '_ {
        let filter = self.filter;
        self.entries.iter().filter(move |r| r.level.admits(filter))
    }

    /// Visible records rendered as plain text lines
    pub fn render_visible(&self, template: &Template) -> Vec<String> {
        self.visible().map(|r| template.render(r, false)).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
