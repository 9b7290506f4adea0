use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/* ============================= STATUS ============================= */

/// Outcome of a single evaluation, target, or check.
///
/// Declaration order is the aggregation order: `Success < Skipped < Warning < Error`.
/// Every place that combines statuses goes through [`Status::worst`] or [`worst_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Success,
    Skipped,
    Warning,
    Error,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Success, Status::Warning, Status::Error, Status::Skipped];

    /// Combine two statuses, keeping the worse one.
    pub fn worst(self, other: Status) -> Status {
        self.max(other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Skipped => "skipped",
            Status::Warning => "warning",
            Status::Error => "error",
        }
    }

    pub fn is_failure(&self, strict: bool) -> bool {
        match self {
            Status::Error => true,
            Status::Warning => strict,
            Status::Success | Status::Skipped => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Ok(Status::Success),
            "skipped" => Ok(Status::Skipped),
            "warning" => Ok(Status::Warning),
            "error" => Ok(Status::Error),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Fold any number of statuses into the worst one. An empty input is `Success`.
pub fn worst_of<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    statuses.into_iter().fold(Status::Success, Status::worst)
}

/* ============================= DETAIL LEVEL ============================= */

/// How much of each resource is projected into displays and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    #[default]
    Summary,
    Detail,
    Verbose,
}

impl DetailLevel {
    pub fn is_verbose(&self) -> bool {
        matches!(self, DetailLevel::Verbose)
    }
}

impl TryFrom<u8> for DetailLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DetailLevel::Summary),
            1 => Ok(DetailLevel::Detail),
            2 => Ok(DetailLevel::Verbose),
            other => Err(format!("detail level must be 0, 1 or 2 (got {other})")),
        }
    }
}

/* ============================= TESTS ============================= */
