use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Rule priority, ordered from most to least severe.
///
/// The numeric value follows the syslog convention: `Emergency` is 0 and
/// `Debug` is 7. Priority names parse case-insensitively, and the
/// abbreviation `info` is accepted for `Informational`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Informational,
    Debug,
}

/// Error returned when a priority name is not in the priority table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid priority '{0}'")]
pub struct InvalidPriority(pub String);

impl Priority {
    /// The numeric severity, 0 (`Emergency`) through 7 (`Debug`).
    #[must_use]
    pub fn as_num(self) -> u8 {
        match self {
            Priority::Emergency => 0,
            Priority::Alert => 1,
            Priority::Critical => 2,
            Priority::Error => 3,
            Priority::Warning => 4,
            Priority::Notice => 5,
            Priority::Informational => 6,
            Priority::Debug => 7,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Priority::Emergency => "Emergency",
            Priority::Alert => "Alert",
            Priority::Critical => "Critical",
            Priority::Error => "Error",
            Priority::Warning => "Warning",
            Priority::Notice => "Notice",
            Priority::Informational => "Informational",
            Priority::Debug => "Debug",
        }
    }
}

impl FromStr for Priority {
    type Err = InvalidPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "emergency" => Ok(Priority::Emergency),
            "alert" => Ok(Priority::Alert),
            "critical" => Ok(Priority::Critical),
            "error" => Ok(Priority::Error),
            "warning" => Ok(Priority::Warning),
            "notice" => Ok(Priority::Notice),
            "informational" | "info" => Ok(Priority::Informational),
            "debug" => Ok(Priority::Debug),
            _ => Err(InvalidPriority(s.to_owned())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
