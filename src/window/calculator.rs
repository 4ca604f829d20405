//! Window calculator
//!
//! Full loads return the configured bounds untouched. Incremental loads start
//! at the last watermark minus a safety margin (truncated to midnight) and end
//! at "now" minus an optional drift cutoff. The window overlaps
//! the previous one; staging upserts absorb the re-fetched records.

use super::types::{midnight, ExtractionWindow};
use crate::config::LoadOptions;
use crate::error::Result;
use crate::types::LoadMode;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use tracing::warn;

/// Minimum margin applied on Mondays so weekend changes are re-covered by a
/// weekday-only schedule
pub const MONDAY_MIN_MARGIN_DAYS: u32 = 3;

/// Margin actually used for `today`
pub fn effective_margin_days(margin_days: u32, today: NaiveDate) -> u32 {
    if today.weekday() == Weekday::Mon && margin_days < MONDAY_MIN_MARGIN_DAYS {
        MONDAY_MIN_MARGIN_DAYS
    } else {
        margin_days
    }
}

/// Compute the extraction window for one run.
///
/// `margin_days = 0` collapses an incremental window to `today@00:00`, which
/// bypasses the watermark and the Monday rule.
pub fn compute_window(
    mode: LoadMode,
    last_watermark: Option<NaiveDateTime>,
    margin_days: u32,
    drift_minutes: u32,
    full_bounds: &ExtractionWindow,
    initial_epoch: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<ExtractionWindow> {
    if mode == LoadMode::Full {
        return ExtractionWindow::new(full_bounds.start, full_bounds.end);
    }

    if margin_days == 0 {
        return Ok(ExtractionWindow::instant(midnight(now.date())));
    }

    let end = now - Duration::minutes(i64::from(drift_minutes));
    let start = match last_watermark {
        None => initial_epoch,
        Some(watermark) => {
            let margin = effective_margin_days(margin_days, now.date());
            midnight((watermark - Duration::days(i64::from(margin))).date())
        }
    };

    if start > end {
        warn!(
            start = %start,
            end = %end,
            "Window start is after end, clamping start to end"
        );
    }

    Ok(ExtractionWindow::clamped(start, end))
}

/// Window calculator bound to one immutable set of load options
#[derive(Debug, Clone)]
pub struct WindowCalculator<'a> {
    options: &'a LoadOptions,
}

impl<'a> WindowCalculator<'a> {
    /// Create a calculator for the given options
    pub fn new(options: &'a LoadOptions) -> Self {
        Self { options }
    }

    /// Window for a run in `mode` given the stored watermark
    pub fn compute(
        &self,
        mode: LoadMode,
        last_watermark: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Result<ExtractionWindow> {
        compute_window(
            mode,
            last_watermark,
            self.options.margin_days,
            self.options.drift_minutes,
            &self.options.full_bounds,
            self.options.initial_epoch,
            now,
        )
    }
}
