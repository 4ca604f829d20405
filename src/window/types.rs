//! Window types and date helpers

use crate::error::{Error, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date format accepted by upstream date filters
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Datetime format accepted by upstream datetime filters
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Formats the upstream may use for timestamps in payloads
const UPSTREAM_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Time range of one extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWindow {
    /// First instant covered
    pub start: NaiveDateTime,
    /// Last instant covered
    pub end: NaiveDateTime,
}

impl ExtractionWindow {
    /// Create a window, failing when `start > end`
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(Error::window(format!(
                "start {} is after end {}",
                format_datetime(start),
                format_datetime(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Create a window, pulling `start` back to `end` when it overshoots
    pub fn clamped(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: start.min(end),
            end,
        }
    }

    /// Window spanning whole days, `start@00:00` to `end@00:00`
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        Self::new(midnight(start), midnight(end))
    }

    /// Single-instant window
    pub fn instant(at: NaiveDateTime) -> Self {
        Self { start: at, end: at }
    }

    /// Length of the window
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether `at` falls inside the window (inclusive on both ends)
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }

    /// Start rendered as an upstream date filter
    pub fn start_date(&self) -> String {
        format_date(self.start)
    }

    /// End rendered as an upstream date filter
    pub fn end_date(&self) -> String {
        format_date(self.end)
    }

    /// Chunk the window into consecutive periods of at most `max_days` days.
    ///
    /// For endpoints that reject long date ranges. Adjacent chunks share their
    /// boundary instant. An empty window yields itself.
    pub fn split(&self, max_days: u32) -> Vec<ExtractionWindow> {
        if max_days == 0 || self.start == self.end {
            return vec![*self];
        }

        let step = Duration::days(i64::from(max_days));
        let mut periods = Vec::new();
        let mut current = self.start;
        while current < self.end {
            let next = (current + step).min(self.end);
            periods.push(ExtractionWindow {
                start: current,
                end: next,
            });
            current = next;
        }
        periods
    }
}

impl fmt::Display for ExtractionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} .. {}]",
            format_datetime(self.start),
            format_datetime(self.end)
        )
    }
}

/// Midnight at the start of `date`
pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Render as `YYYY-MM-DD`
pub fn format_date(at: NaiveDateTime) -> String {
    at.format(DATE_FORMAT).to_string()
}

/// Render as `YYYY-MM-DDTHH:MM:SS`
pub fn format_datetime(at: NaiveDateTime) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

/// Parse an upstream timestamp or date, returning `None` for blanks,
/// zero dates and anything unparseable
pub fn parse_upstream_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() || value.starts_with("0000-00-00") {
        return None;
    }

    for fmt in UPSTREAM_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .map(midnight)
}
