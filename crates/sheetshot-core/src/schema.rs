use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::CoreError;

/// Storage format of `ScreenshotRecord::timestamp`, also used in filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// -- Scope --

/// Archive partition identified by a (user, chat) pair.
///
/// Serialized as `user_<id>_chat_<id>` so the metadata document keeps its
/// string-keyed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scope {
    pub user_id: i64,
    pub chat_id: i64,
}

impl Scope {
    /// Scope holding scheduler-created records, visible to everyone.
    pub const SYSTEM: Scope = Scope {
        user_id: 0,
        chat_id: 0,
    };

    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self { user_id, chat_id }
    }

    pub fn is_system(&self) -> bool {
        *self == Self::SYSTEM
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user_{}_chat_{}", self.user_id, self.chat_id)
    }
}

impl FromStr for Scope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidScope(s.to_string());
        let rest = s.strip_prefix("user_").ok_or_else(invalid)?;
        let (user, chat) = rest.split_once("_chat_").ok_or_else(invalid)?;
        let user_id = user.parse().map_err(|_| invalid())?;
        let chat_id = chat.parse().map_err(|_| invalid())?;
        Ok(Self { user_id, chat_id })
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// -- Records --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub label: String,
    pub timestamp: String,
    pub filepath: String,
    pub user_id: i64,
    pub chat_id: i64,
}

impl ScreenshotRecord {
    pub fn scope(&self) -> Scope {
        Scope::new(self.user_id, self.chat_id)
    }

    /// Final path component of `filepath`, the handle used by delete.
    pub fn filename(&self) -> Option<&str> {
        Path::new(&self.filepath).file_name().and_then(|n| n.to_str())
    }

    /// Parsed creation time, `None` if the stored timestamp is not canonical.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// Scope → records, in save order. Mirrors `metadata.json` one to one.
pub type MetadataIndex = BTreeMap<Scope, Vec<ScreenshotRecord>>;

/// Aggregate outcome of a bulk delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteReport {
    pub succeeded: usize,
    pub failed: usize,
    pub failed_filenames: Vec<String>,
}

impl BatchDeleteReport {
    pub fn record(&mut self, filename: &str, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            self.failed_filenames.push(filename.to_string());
        }
    }
}

// -- Timestamps --

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(ts: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()
}

/// Convert a date query (`YYYY-MM-DD`, `YYYY-MM`, `YYYY` or the compact
/// digit form) into a prefix of the stored timestamp format.
///
/// Returns `None` for any other shape.
pub fn date_prefix(date: &str) -> Option<String> {
    let parts: Vec<&str> = date.trim().split('-').collect();
    let shape_ok = match parts.as_slice() {
        [compact] => matches!(compact.len(), 4 | 6 | 8),
        [year, rest @ ..] if rest.len() <= 2 => {
            year.len() == 4 && rest.iter().all(|p| p.len() == 2)
        }
        _ => false,
    };
    if !shape_ok || !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    Some(parts.concat())
}

/// Parse a `YYYY-MM-DD` bound as used by period filters.
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}
