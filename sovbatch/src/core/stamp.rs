//! Sortable timestamps used in every generated file name.
//!
//! Stamps look like `20240101_093015_000042` (UTC, microsecond resolution).
//! Lexicographic order of stamps equals chronological order.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

static STAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}_\d{6}_\d{6}$").unwrap());

/// A validated, sortable timestamp suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(String);

impl Stamp {
    /// Parse a stamp suffix, returning `None` if it is not in canonical form.
    pub fn parse(raw: &str) -> Option<Self> {
        STAMP_RE.is_match(raw).then(|| Self(raw.to_string()))
    }

    /// Format an instant as a stamp (truncated to microseconds).
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(STAMP_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues strictly increasing stamps.
///
/// Two calls within the same microsecond still receive distinct stamps: the
/// second one is bumped one microsecond past the previous stamp.
#[derive(Debug, Default)]
pub struct StampClock {
    last_micros: Option<i64>,
}

impl StampClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next stamp based on the wall clock.
    pub fn next(&mut self) -> Stamp {
        self.next_at(Utc::now())
    }

    /// Next stamp as if the wall clock read `now`.
    pub fn next_at(&mut self, now: DateTime<Utc>) -> Stamp {
        let mut micros = now.timestamp_micros();
        if let Some(last) = self.last_micros {
            if micros <= last {
                micros = last + 1;
            }
        }
        self.last_micros = Some(micros);
        let at = DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or(now);
        Stamp::from_datetime(at)
    }
}
