// src/verify.rs

//! Post-transfer verification: compare source and destination object count
//! and byte totals against a tolerance.
//!
//! All comparisons are exact integer arithmetic. The tolerance is stored in
//! millionths of a percent so that e.g. a 0.1% tolerance and a delta of
//! exactly 1 000 bytes out of 1 000 000 compare as equal, not as a float
//! rounding accident.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Millionths of a percent per percent.
const MICRO: u128 = 1_000_000;

/// Allowed relative difference, as a percentage of the source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tolerance {
    micro_percent: u64,
}

impl Tolerance {
    /// Negative or non-finite input is clamped to zero.
    pub fn from_percent(percent: f64) -> Self {
        let micro = if percent.is_finite() && percent > 0.0 {
            (percent * MICRO as f64).round() as u64
        } else {
            0
        };
        Self {
            micro_percent: micro,
        }
    }

    pub fn as_percent(self) -> f64 {
        self.micro_percent as f64 / MICRO as f64
    }

    /// Whether `|source - destination|` relative to `source` is strictly
    /// greater than this tolerance. A delta exactly at the tolerance is
    /// accepted.
    ///
    /// A zero source with a non-zero destination always exceeds.
    pub fn is_exceeded(self, source: u64, destination: u64) -> bool {
        let diff = source.abs_diff(destination) as u128;
        if source == 0 {
            return diff > 0;
        }
        diff * 100 * MICRO > self.micro_percent as u128 * source as u128
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}%", self.as_percent())
    }
}

/// Object count and byte total of one remote path, as reported by
/// `rclone size --json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStats {
    pub count: u64,
    pub bytes: u64,
}

/// Result of comparing two successful measurements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub source: SizeStats,
    pub destination: SizeStats,
    pub tolerance: Tolerance,
    pub bytes_exceeded: bool,
    pub count_exceeded: bool,
}

impl Comparison {
    pub fn new(source: SizeStats, destination: SizeStats, tolerance: Tolerance) -> Self {
        Self {
            source,
            destination,
            tolerance,
            bytes_exceeded: tolerance.is_exceeded(source.bytes, destination.bytes),
            count_exceeded: tolerance.is_exceeded(source.count, destination.count),
        }
    }

    pub fn is_mismatch(&self) -> bool {
        self.bytes_exceeded || self.count_exceeded
    }

    /// One-line human summary appended to the run log.
    pub fn summary(&self) -> String {
        format!(
            "Verification: source {} objects / {}, destination {} objects / {} \
             (bytes delta {}, count delta {}, tolerance {}) - {}",
            self.source.count,
            format_bytes(self.source.bytes),
            self.destination.count,
            format_bytes(self.destination.bytes),
            format_delta(self.source.bytes, self.destination.bytes),
            format_delta(self.source.count, self.destination.count),
            self.tolerance,
            if self.is_mismatch() { "MISMATCH" } else { "OK" },
        )
    }
}

fn format_delta(source: u64, destination: u64) -> String {
    if source == 0 {
        return if destination == 0 {
            "0.000%".to_string()
        } else {
            "n/a".to_string()
        };
    }
    let pct = source.abs_diff(destination) as f64 * 100.0 / source as f64;
    format!("{pct:.3}%")
}

/// Render a byte count with a binary unit, e.g. `1.5 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    let b = bytes as f64;
    if b >= TB {
        format!("{:.1} TB", b / TB)
    } else if b >= GB {
        format!("{:.1} GB", b / GB)
    } else if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}
