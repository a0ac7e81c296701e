//! Wall-clock access for the engine.
//!
//! Resolvers never read the clock themselves; they take `now` as a parameter.
//! The engine owns a [`Clock`] and passes its reading down, so tests can pin
//! time with [`FixedClock`].

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{FilterError, Result};

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

/// Reads the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Clones share the same reading.
#[derive(Debug, Clone)]
pub struct FixedClock {
    inner: Arc<Mutex<NaiveDateTime>>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            inner: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward by `delta`. Saturates at chrono's upper bound.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = guard.checked_add_signed(delta) {
            *guard = next;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse a local date or date-time as typed on the command line or in config.
///
/// Accepted forms:
/// - `2024-04-01` (midnight)
/// - `2024-04-01T08:30:00` / `2024-04-01 08:30:00`
/// - either of the above with fractional seconds
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| FilterError::InvalidDateTime(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_date_only_is_midnight() {
        let parsed = parse_datetime("2024-04-01").unwrap();
        assert_eq!(parsed.to_string(), "2024-04-01 00:00:00");
    }

    #[test]
    fn test_parse_datetime_forms() {
        assert_eq!(
            parse_datetime("2024-04-01T08:30:00").unwrap(),
            parse_datetime("2024-04-01 08:30:00").unwrap()
        );
        assert_eq!(
            parse_datetime("2024-04-01T08:30").unwrap().to_string(),
            "2024-04-01 08:30:00"
        );
        let millis = parse_datetime("2024-03-31T23:59:59.999").unwrap();
        assert_eq!(millis.nanosecond() / 1_000_000, 999);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_datetime("yesterday"),
            Err(FilterError::InvalidDateTime(_))
        ));
    }

    #[test]
    fn test_fixed_clock_shared_between_clones() {
        let clock = FixedClock::new(parse_datetime("2024-01-01").unwrap());
        let other = clock.clone();
        other.advance(chrono::Duration::hours(2));
        assert_eq!(clock.now().to_string(), "2024-01-01 02:00:00");
    }
}
