//! Severity ranking and trend computation
//!
//! Severities follow the ITU-T M.3100 / X.736 perceived-severity model
//! (see also RFC 5674): a small closed set with a total rank order, where a
//! *lower* rank means *more* severe. Several names intentionally share the
//! lowest-severity rank (`normal`, `cleared`, `indeterminate`).
//!
//! Wire values are the lowercase names; anything else fails to parse, so an
//! invalid severity never silently degrades to `unknown`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rank shared by `normal`, `cleared` and `indeterminate`
pub const NORMAL_RANK: u8 = 5;

/// Perceived severity of an event or alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Warning,
    Normal,
    Cleared,
    Indeterminate,
    Informational,
    Debug,
    Security,
    Unknown,
}

impl Severity {
    /// Rank in the default severity table (lower = more severe)
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 1,
            Severity::Major => 2,
            Severity::Minor => 3,
            Severity::Warning => 4,
            Severity::Normal | Severity::Cleared | Severity::Indeterminate => NORMAL_RANK,
            Severity::Informational => 6,
            Severity::Debug => 7,
            Severity::Security => 8,
            Severity::Unknown => 9,
        }
    }

    /// Whether this severity sits on the shared normal/cleared rank
    pub fn is_normal_rank(&self) -> bool {
        self.rank() == NORMAL_RANK
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
            Severity::Warning => "warning",
            Severity::Normal => "normal",
            Severity::Cleared => "cleared",
            Severity::Indeterminate => "indeterminate",
            Severity::Informational => "informational",
            Severity::Debug => "debug",
            Severity::Security => "security",
            Severity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional comparison between two severities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trend {
    MoreSevere,
    LessSevere,
    NoChange,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trend::MoreSevere => "moreSevere",
            Trend::LessSevere => "lessSevere",
            Trend::NoChange => "noChange",
        };
        f.write_str(s)
    }
}

/// Compare two severities in the default rank table
pub fn trend(previous: Severity, current: Severity) -> Trend {
    if current.rank() < previous.rank() {
        Trend::MoreSevere
    } else if current.rank() > previous.rank() {
        Trend::LessSevere
    } else {
        Trend::NoChange
    }
}
