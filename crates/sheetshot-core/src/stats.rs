use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::schema::{parse_date, ScreenshotRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    pub total_this_month: usize,
    pub remaining_limit: usize,
    /// Share of the monthly limit used, capped at 100.
    pub usage_percent: f64,
}

/// Count records created in the calendar month of `now` against `limit`.
pub fn monthly_stats(records: &[ScreenshotRecord], now: NaiveDateTime, limit: u32) -> MonthlyStats {
    let total = records
        .iter()
        .filter_map(ScreenshotRecord::created_at)
        .filter(|at| at.year() == now.year() && at.month() == now.month())
        .count();

    let limit = limit as usize;
    let usage_percent = if limit == 0 {
        100.0
    } else {
        (total as f64 / limit as f64 * 100.0).min(100.0)
    };

    debug!(total, limit, usage_percent, "monthly usage");
    MonthlyStats {
        total_this_month: total,
        remaining_limit: limit.saturating_sub(total),
        usage_percent,
    }
}

/// Records whose creation date lies in `start..=end` (`YYYY-MM-DD`).
///
/// Invalid bounds yield an empty result.
pub fn filter_by_period(
    records: &[ScreenshotRecord],
    start: &str,
    end: &str,
) -> Vec<ScreenshotRecord> {
    let (Some(start), Some(end)) = (parse_date(start), parse_date(end)) else {
        warn!(start, end, "invalid period bounds");
        return Vec::new();
    };

    records
        .iter()
        .filter(|r| {
            r.created_at()
                .map(|at| (start..=end).contains(&at.date()))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
