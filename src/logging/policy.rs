// SPDX-License-Identifier: Apache-2.0 OR MIT
// File sink policies: rotation trigger, retention and compression
//
// Accepted spellings:
//   rotation:    "10 MB", "512 KiB", "1 week", "12 hours", "00:00" (daily)
//   retention:   "7 days", "20" (keep 20 rotated files)
//   compression: "zstd" / "zst", "zip", "gz" / "gzip"

use chrono::NaiveTime;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid rotation '{0}': expected a size (\"10 MB\"), a duration (\"1 day\") or a time of day (\"12:00\")")]
    Rotation(String),

    #[error("invalid retention '{0}': expected a duration (\"7 days\") or a file count (\"20\")")]
    Retention(String),

    #[error("unsupported compression '{0}': expected \"zstd\", \"zip\" or \"gz\"")]
    Compression(String),
}

/// When the active file is closed and a fresh one started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Rotate before a write would push the file past this many bytes
    Size(u64),
    /// Rotate when the file has been open this long
    Interval(Duration),
    /// Rotate every day at this local time
    Daily(NaiveTime),
}

/// Which rotated files are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep the N most recent rotated files
    Count(usize),
    /// Remove rotated files older than this
    Age(Duration),
}

/// Compression applied to rotated files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Zstd,
    /// Single-entry zip archive
    Zip,
    Gz,
}

impl Compression {
    pub const ALL: [Compression; 3] = [Compression::Zstd, Compression::Zip, Compression::Gz];

    pub const fn extension(self) -> &'static str {
        match self {
            Compression::Zstd => "zst",
            Compression::Zip => "zip",
            Compression::Gz => "gz",
        }
    }
}

impl FromStr for Rotation {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let err = || PolicyError::Rotation(s.to_string());

        if text.contains(':') {
            let time = NaiveTime::parse_from_str(text, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
                .map_err(|_| err())?;
            return Ok(Rotation::Daily(time));
        }

        let (amount, unit) = split_amount(text).ok_or_else(err)?;
        if let Some(bytes) = size_unit(&unit) {
            let size = (amount * bytes as f64) as u64;
            return if size == 0 { Err(err()) } else { Ok(Rotation::Size(size)) };
        }
        let seconds = duration_unit(&unit).ok_or_else(err)?;
        let interval = Duration::try_from_secs_f64(amount * seconds as f64).map_err(|_| err())?;
        if interval.is_zero() {
            return Err(err());
        }
        Ok(Rotation::Interval(interval))
    }
}

impl FromStr for Retention {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let err = || PolicyError::Retention(s.to_string());

        if let Ok(count) = text.parse::<usize>() {
            return Ok(Retention::Count(count));
        }
        let (amount, unit) = split_amount(text).ok_or_else(err)?;
        let seconds = duration_unit(&unit).ok_or_else(err)?;
        Duration::try_from_secs_f64(amount * seconds as f64)
            .map(Retention::Age)
            .map_err(|_| err())
    }
}

impl FromStr for Compression {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zstd" | "zst" => Ok(Compression::Zstd),
            "zip" => Ok(Compression::Zip),
            "gz" | "gzip" => Ok(Compression::Gz),
            _ => Err(PolicyError::Compression(s.to_string())),
        }
    }
}

/// Split "10 MB" / "10MB" / "1.5 days" into (10.0, "mb")
fn split_amount(text: &str) -> Option<(f64, String)> {
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let amount: f64 = text[..split].parse().ok()?;
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    let unit = text[split..].trim().to_ascii_lowercase();
    if unit.is_empty() {
        return None;
    }
    Some((amount, unit))
}

fn size_unit(unit: &str) -> Option<u64> {
    Some(match unit {
        "b" => 1,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        _ => return None,
    })
}

fn duration_unit(unit: &str) -> Option<u64> {
    Some(match unit {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        _ => return None,
    })
}
