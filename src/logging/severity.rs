// SPDX-License-Identifier: Apache-2.0 OR MIT
// Severity levels, ordered from least to most severe

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Log severity levels.
///
/// The discriminant is the rank: a record at level `L` passes a sink with
/// minimum level `M` iff `L >= M`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Very fine-grained tracing
    Trace = 0,
    /// Debugging detail
    Debug = 1,
    /// Normal operation
    Info = 2,
    /// An operation completed successfully
    Success = 3,
    /// Something unexpected, operation continues
    Warning = 4,
    /// Operation failed
    Error = 5,
    /// The process cannot continue normally
    Critical = 6,
}

impl Severity {
    /// All levels in rank order.
    pub const ALL: [Severity; 7] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Success,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    /// Get the rank (0 = TRACE, 6 = CRITICAL)
    #[inline]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Get severity name as static string
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Create from rank (returns None if out of range)
    pub const fn from_rank(value: u8) -> Option<Self> {
        match value {
            0 => Some(Severity::Trace),
            1 => Some(Severity::Debug),
            2 => Some(Severity::Info),
            3 => Some(Severity::Success),
            4 => Some(Severity::Warning),
            5 => Some(Severity::Error),
            6 => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Whether a record at this level passes a filter set to `minimum`.
    #[inline]
    pub fn admits(self, minimum: Severity) -> bool {
        self >= minimum
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // pad() so that `{:<8}` in format strings works
        f.pad(self.as_str())
    }
}

/// Error returned when a string is not a known severity name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}' (expected TRACE, DEBUG, INFO, SUCCESS, WARNING, ERROR or CRITICAL)")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "TRACE" => Ok(Severity::Trace),
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "SUCCESS" => Ok(Severity::Success),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}
