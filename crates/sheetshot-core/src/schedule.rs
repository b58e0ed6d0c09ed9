//! Which scheduled captures are due, and when.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

use crate::error::{CoreError, Result};

/// Canonical label of the once-a-day capture, also used as the duplicate guard.
pub fn daily_label(date: NaiveDate) -> String {
    format!("Ежедневный отчет {}", date.format("%Y-%m-%d"))
}

pub fn last_day_of_month(date: NaiveDate) -> u32 {
    let next_month = date.with_day(28).unwrap_or(date) + Duration::days(4);
    (next_month - Duration::days(next_month.day() as i64)).day()
}

/// Labels to capture on `date`: the month markers that apply, then the daily report.
pub fn plan_for(date: NaiveDate) -> Vec<String> {
    let day = date.format("%Y-%m-%d");
    let mut labels = Vec::new();

    if date.day() == 1 {
        labels.push(format!("Начало месяца {day}"));
    } else if date.day() == 15 {
        labels.push(format!("Середина месяца {day}"));
    } else if date.day() == last_day_of_month(date) {
        labels.push(format!("Конец месяца {day}"));
    }

    labels.push(daily_label(date));
    labels
}

/// Parse a `HH:MM` slot time.
pub fn parse_slot(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| CoreError::Config(format!("invalid schedule time {value:?}: {e}")))
}

/// A daily slot that fires at most once per date.
#[derive(Debug, Clone)]
pub struct DailySlot {
    at: NaiveTime,
    last_fired: Option<NaiveDate>,
}

impl DailySlot {
    pub fn new(at: NaiveTime) -> Self {
        Self {
            at,
            last_fired: None,
        }
    }

    /// Returns `true` (once per date) when `now_date`/`now_time` is at or past the slot.
    pub fn poll(&mut self, now_date: NaiveDate, now_time: NaiveTime) -> bool {
        if now_time < self.at || self.last_fired == Some(now_date) {
            return false;
        }
        self.last_fired = Some(now_date);
        true
    }
}
