//! RFC 3339 timestamp encoding shared by every backend.
//!
//! Two renderings are used:
//! - [`format`] — shortest exact form, for files and export bundles.
//! - [`format_sortable`] — fixed-width nanosecond form, for SQLite text
//!   columns so that `ORDER BY` on the raw text is chronological.
//!
//! [`parse`] accepts RFC 3339 only. Anything else is a validation error.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

use crate::persistence::PersistenceError;

pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn format_sortable(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Validation(format!("invalid RFC 3339 timestamp {raw:?}: {e}")))
}

/// Serde adapter: `#[serde(with = "crate::timestamp")]`.
pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}
