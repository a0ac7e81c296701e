//! Date preset registry and resolution.
//!
//! Five modes exist: four clock-relative lookbacks and `custom`. Resolution is
//! a pure function of `(mode, now)`; identical inputs always yield identical
//! intervals.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::FilterError;

/// Date-range mode selected in the filter bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DateMode {
    #[serde(rename = "24h")]
    Last24Hours,
    #[default]
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "quarter")]
    Quarter,
    #[serde(rename = "custom")]
    Custom,
}

impl DateMode {
    pub const ALL: [DateMode; 5] = [
        DateMode::Last24Hours,
        DateMode::Last7Days,
        DateMode::Last30Days,
        DateMode::Quarter,
        DateMode::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateMode::Last24Hours => "24h",
            DateMode::Last7Days => "7d",
            DateMode::Last30Days => "30d",
            DateMode::Quarter => "quarter",
            DateMode::Custom => "custom",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateMode::Last24Hours => "Last 24 hours",
            DateMode::Last7Days => "Last 7 days",
            DateMode::Last30Days => "Last 30 days",
            DateMode::Quarter => "This quarter",
            DateMode::Custom => "Custom range",
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, DateMode::Custom)
    }

    /// Look up a mode by key, falling back to `7d` for anything unregistered.
    pub fn from_key_or_default(key: &str) -> DateMode {
        key.parse().unwrap_or_else(|_| {
            warn!(key, "unknown date preset, falling back to 7d");
            DateMode::default()
        })
    }
}

impl fmt::Display for DateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DateMode {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| FilterError::UnknownDateMode(s.to_string()))
    }
}

/// A date interval in local wall-clock time. Either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl Interval {
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    pub fn closed(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Resolve a preset against `now`.
///
/// `custom` resolves to an open interval: callers read the custom range from
/// the filter intent instead.
pub fn resolve(mode: DateMode, now: NaiveDateTime) -> Interval {
    match mode {
        DateMode::Last24Hours => lookback(now, chrono::Duration::hours(24)),
        DateMode::Last7Days => lookback(now, chrono::Duration::days(7)),
        DateMode::Last30Days => lookback(now, chrono::Duration::days(30)),
        DateMode::Quarter => quarter_containing(now.date())
            .map(|(start, end)| Interval::closed(start, end))
            .unwrap_or_default(),
        DateMode::Custom => Interval::default(),
    }
}

/// Resolve by string key, applying the `7d` fallback for unknown keys.
pub fn resolve_key(key: &str, now: NaiveDateTime) -> Interval {
    resolve(DateMode::from_key_or_default(key), now)
}

fn lookback(now: NaiveDateTime, span: chrono::Duration) -> Interval {
    Interval::new(now.checked_sub_signed(span), Some(now))
}

/// First day 00:00:00.000 through last day 23:59:59.999 of the calendar
/// quarter containing `date`. `None` only at the edge of chrono's range.
fn quarter_containing(date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let first_month = (date.month0() / 3) * 3 + 1;
    let first_day = NaiveDate::from_ymd_opt(date.year(), first_month, 1)?;
    let next_quarter = if first_month == 10 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(date.year(), first_month + 3, 1)?
    };
    let last_day = next_quarter.pred_opt()?;
    Some((
        first_day.and_hms_opt(0, 0, 0)?,
        last_day.and_hms_milli_opt(23, 59, 59, 999)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_datetime;

    fn at(value: &str) -> NaiveDateTime {
        parse_datetime(value).unwrap()
    }

    #[test]
    fn test_key_roundtrip() {
        for mode in DateMode::ALL {
            let parsed: DateMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_serde_uses_wire_keys() {
        assert_eq!(serde_json::to_string(&DateMode::Last24Hours).unwrap(), "\"24h\"");
        let parsed: DateMode = serde_json::from_str("\"quarter\"").unwrap();
        assert_eq!(parsed, DateMode::Quarter);
    }

    #[test]
    fn test_unknown_key_falls_back_to_seven_days() {
        assert!("week".parse::<DateMode>().is_err());
        assert_eq!(DateMode::from_key_or_default("week"), DateMode::Last7Days);

        let now = at("2024-05-10T12:00:00");
        assert_eq!(resolve_key("week", now), resolve(DateMode::Last7Days, now));
    }

    #[test]
    fn test_lookbacks() {
        let now = at("2024-05-10T12:00:00");
        assert_eq!(
            resolve(DateMode::Last24Hours, now),
            Interval::closed(at("2024-05-09T12:00:00"), now)
        );
        assert_eq!(
            resolve(DateMode::Last7Days, now),
            Interval::closed(at("2024-05-03T12:00:00"), now)
        );
        assert_eq!(
            resolve(DateMode::Last30Days, now),
            Interval::closed(at("2024-04-10T12:00:00"), now)
        );
    }

    #[test]
    fn test_custom_resolves_open() {
        assert!(resolve(DateMode::Custom, at("2024-05-10")).is_open());
    }

    #[test]
    fn test_quarter_is_deterministic() {
        let now = at("2024-05-10T12:34:56");
        assert_eq!(resolve(DateMode::Quarter, now), resolve(DateMode::Quarter, now));
        assert_eq!(
            resolve(DateMode::Quarter, now),
            Interval::closed(at("2024-04-01"), at("2024-06-30T23:59:59.999"))
        );
    }

    #[test]
    fn test_quarter_boundaries() {
        let boundary = resolve(DateMode::Quarter, at("2024-04-01T00:00:00"));
        assert_eq!(boundary.start, Some(at("2024-04-01")));

        let previous = resolve(DateMode::Quarter, at("2024-03-31T23:59:59"));
        assert_eq!(previous.start, Some(at("2024-01-01")));
        assert_eq!(previous.end, Some(at("2024-03-31T23:59:59.999")));
    }

    #[test]
    fn test_fourth_quarter_rolls_year() {
        let q4 = resolve(DateMode::Quarter, at("2023-11-15"));
        assert_eq!(
            q4,
            Interval::closed(at("2023-10-01"), at("2023-12-31T23:59:59.999"))
        );
    }
}
