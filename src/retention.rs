//! Retention selectors accepted at upload time.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FileError;

/// Enumerated lifetimes a file can be uploaded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Retention {
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    TwelveHours,
    OneDay,
    SevenDays,
}

impl Retention {
    pub const ALL: [Retention; 6] = [
        Retention::FiveMinutes,
        Retention::FifteenMinutes,
        Retention::OneHour,
        Retention::TwelveHours,
        Retention::OneDay,
        Retention::SevenDays,
    ];

    /// Offset added to the upload time to obtain `expires_at`
    pub fn offset(&self) -> Duration {
        match self {
            Retention::FiveMinutes => Duration::minutes(5),
            Retention::FifteenMinutes => Duration::minutes(15),
            Retention::OneHour => Duration::hours(1),
            Retention::TwelveHours => Duration::hours(12),
            Retention::OneDay => Duration::hours(24),
            Retention::SevenDays => Duration::days(7),
        }
    }

    /// Wire token, e.g. `"1h"`
    pub fn as_str(&self) -> &'static str {
        match self {
            Retention::FiveMinutes => "5m",
            Retention::FifteenMinutes => "15m",
            Retention::OneHour => "1h",
            Retention::TwelveHours => "12h",
            Retention::OneDay => "24h",
            Retention::SevenDays => "7d",
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Retention {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Retention::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| FileError::Validation(format!("unsupported retention: {}", s)))
    }
}
