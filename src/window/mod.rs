//! Extraction window module
//!
//! Derives the `[start, end]` range each entity run asks the upstream for.
//!
//! # Overview
//!
//! - `ExtractionWindow` - ephemeral `(start, end)` pair, always `start <= end`
//! - `WindowCalculator` - full vs. incremental window selection with safety
//!   margin, drift cutoff and the Monday overlap rule
//! - Formatting helpers for upstream filter parameters

mod calculator;
mod types;

pub use calculator::{
    compute_window, effective_margin_days, WindowCalculator, MONDAY_MIN_MARGIN_DAYS,
};
pub use types::{
    format_date, format_datetime, midnight, parse_upstream_datetime, ExtractionWindow,
};
