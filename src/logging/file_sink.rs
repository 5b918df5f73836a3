// SPDX-License-Identifier: Apache-2.0 OR MIT
// Rotating file sink
//
// Rotated files are renamed next to the active file as
// `<stem>.<YYYY-MM-DD_HH-MM-SS_ffffff>.<ext>` (plus `.zst`, `.zip` or `.gz`
// when compressed),
// so a lexical sort of the siblings is also a chronological one.

use super::entry::LogRecord;
use super::format::Template;
use super::policy::{Compression, Retention, Rotation};
use super::sink::{FileSinkConfig, LogSink, SinkError};
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const ROTATED_STAMP: &str = "%Y-%m-%d_%H-%M-%S_%6f";

pub struct FileSink {
    path: PathBuf,
    file: File,
    template: Template,
    written: u64,
    opened_at: DateTime<Local>,
    next_daily: Option<DateTime<Local>>,
    last_stamp: Option<DateTime<Local>>,
    rotation: Option<Rotation>,
    retention: Option<Retention>,
    compression: Option<Compression>,
}

impl FileSink {
    /// Open (appending) the file a sink config names, creating parent
    /// directories first
    pub fn open(config: &FileSinkConfig) -> Result<Self, SinkError> {
        let template = config.template()?;
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SinkError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = open_append(&config.path).map_err(|source| SinkError::Open {
            path: config.path.clone(),
            source,
        })?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        let now = Local::now();

        Ok(Self {
            path: config.path.clone(),
            file,
            template,
            written,
            opened_at: now,
            next_daily: daily_deadline(config.rotation, now),
            last_stamp: None,
            rotation: config.rotation,
            retention: config.retention,
            compression: config.compression,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn should_rotate(&self, incoming: u64, now: DateTime<Local>) -> bool {
        match self.rotation {
            None => false,
            // An oversized record still goes somewhere: into a fresh file
            Some(Rotation::Size(limit)) => self.written > 0 && self.written + incoming > limit,
            Some(Rotation::Interval(interval)) => {
                let elapsed = now.signed_duration_since(self.opened_at);
                elapsed.to_std().map(|e| e >= interval).unwrap_or(false)
            }
            Some(Rotation::Daily(_)) => self.next_daily.is_some_and(|deadline| now >= deadline),
        }
    }

    /// Close the active file under a timestamped name and start a fresh one
    fn rotate(&mut self, now: DateTime<Local>) -> io::Result<()> {
        self.file.flush()?;
        // Stamps must stay unique and increasing even for back-to-back rotations
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        let rotated = self.rotated_path(stamp);
        fs::rename(&self.path, &rotated)?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        self.opened_at = now;
        self.next_daily = daily_deadline(self.rotation, now);

        if let Some(compression) = self.compression {
            compress(&rotated, compression)?;
        }
        if let Some(retention) = self.retention {
            self.prune(retention)?;
        }
        Ok(())
    }

    fn rotated_path(&self, now: DateTime<Local>) -> PathBuf {
        let stem = self.stem();
        let stamp = now.format(ROTATED_STAMP);
        let name = match self.extension() {
            Some(ext) => format!("{}.{}.{}", stem, stamp, ext),
            None => format!("{}.{}", stem, stamp),
        };
        self.path.with_file_name(name)
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
    }

    /// Rotated siblings of the active file, oldest first
    pub fn rotated_files(&self) -> io::Result<Vec<PathBuf>> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = self.stem();
        let ext = self.extension();

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_rotated_name(name, &stem, ext.as_deref()) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    fn prune(&self, retention: Retention) -> io::Result<()> {
        let rotated = self.rotated_files()?;
        match retention {
            Retention::Count(keep) => {
                let excess = rotated.len().saturating_sub(keep);
                for path in &rotated[..excess] {
                    fs::remove_file(path)?;
                }
            }
            Retention::Age(max_age) => {
                let now = SystemTime::now();
                for path in &rotated {
                    let modified = fs::metadata(path)?.modified()?;
                    let age = now.duration_since(modified).unwrap_or_default();
                    if age > max_age {
                        fs::remove_file(path)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl LogSink for FileSink {
    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        let mut line = self.template.render(record, false);
        line.push('\n');
        let now = Local::now();

        // A failed rotation still lets the record through to whatever file
        // is open; the rotation error is reported afterwards.
        let rotated = if self.should_rotate(line.len() as u64, now) {
            self.rotate(now)
        } else {
            Ok(())
        };

        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.written += line.len() as u64;
        rotated
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn daily_deadline(rotation: Option<Rotation>, now: DateTime<Local>) -> Option<DateTime<Local>> {
    match rotation {
        Some(Rotation::Daily(at)) => next_daily(now, at),
        _ => None,
    }
}

/// First local instant after `now` whose wall clock reads `at`
fn next_daily(now: DateTime<Local>, at: NaiveTime) -> Option<DateTime<Local>> {
    let mut date = now.date_naive();
    // Two days are enough to step over a DST gap swallowing `at`
    for _ in 0..3 {
        if let Some(candidate) = date.and_time(at).and_local_timezone(Local).earliest() {
            if candidate > now {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

fn is_rotated_name(name: &str, stem: &str, ext: Option<&str>) -> bool {
    let Some(rest) = name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('.'))
    else {
        return false;
    };
    let rest = Compression::ALL
        .iter()
        .find_map(|c| {
            rest.strip_suffix(c.extension())
                .and_then(|r| r.strip_suffix('.'))
        })
        .unwrap_or(rest);
    let stamp = match ext {
        Some(ext) => match rest
            .strip_suffix(ext)
            .and_then(|rest| rest.strip_suffix('.'))
        {
            Some(stamp) => stamp,
            None => return false,
        },
        None => rest,
    };
    NaiveDateTime::parse_from_str(stamp, ROTATED_STAMP).is_ok()
}

fn compress(path: &Path, compression: Compression) -> io::Result<()> {
    let mut target = path.as_os_str().to_owned();
    target.push(".");
    target.push(compression.extension());

    let mut source = File::open(path)?;
    let dest = File::create(&target)?;
    match compression {
        Compression::Zstd => {
            zstd::stream::copy_encode(source, dest, zstd::DEFAULT_COMPRESSION_LEVEL)?;
        }
        Compression::Zip => {
            let entry = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut archive = zip::ZipWriter::new(dest);
            archive
                .start_file(entry, zip::write::SimpleFileOptions::default())
                .map_err(io::Error::other)?;
            io::copy(&mut source, &mut archive)?;
            archive.finish().map_err(io::Error::other)?;
        }
        Compression::Gz => {
            let mut encoder = flate2::write::GzEncoder::new(dest, flate2::Compression::default());
            io::copy(&mut source, &mut encoder)?;
            encoder.finish()?;
        }
    }
    fs::remove_file(path)
}
