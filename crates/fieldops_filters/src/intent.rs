//! Raw, user-edited filter state and the apply status block next to it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::config::EngineConfig;
use crate::presets::{self, DateMode};
use crate::query::EffectiveQuery;

/// A single-valued filter that is either unrestricted or pinned to one id.
///
/// Serialised as a plain string with `"all"` as the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selection {
    #[default]
    All,
    Only(String),
}

impl Selection {
    pub const ALL_SENTINEL: &'static str = "all";

    pub fn only(value: impl Into<String>) -> Self {
        Selection::from(value.into())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Selection::All => Self::ALL_SENTINEL,
            Selection::Only(value) => value,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Selection::All => None,
            Selection::Only(value) => Some(value),
        }
    }
}

impl From<String> for Selection {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == Self::ALL_SENTINEL {
            Selection::All
        } else {
            Selection::Only(trimmed.to_string())
        }
    }
}

impl From<&str> for Selection {
    fn from(value: &str) -> Self {
        Selection::from(value.to_string())
    }
}

impl From<Selection> for String {
    fn from(value: Selection) -> Self {
        match value {
            Selection::All => Selection::ALL_SENTINEL.to_string(),
            Selection::Only(value) => value,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The filter selections as the user left them, before any resolution.
///
/// `custom_start`/`custom_end` are only authoritative in custom mode but are
/// kept while a preset is active so the range survives toggling back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterIntent {
    pub date_mode: DateMode,
    pub custom_start: Option<NaiveDateTime>,
    pub custom_end: Option<NaiveDateTime>,
    pub technician: Selection,
    pub municipalities: BTreeSet<String>,
    pub selected_regions: BTreeSet<String>,
    pub action: Selection,
}

impl FilterIntent {
    /// Initial intent for an engine built from `config`.
    ///
    /// A preset mode snapshots its interval into the custom range unless the
    /// config supplies an explicit range, which is then kept as the
    /// remembered custom range.
    pub fn seeded(config: &EngineConfig, now: NaiveDateTime) -> Self {
        let mut intent = FilterIntent {
            date_mode: config.initial_date_mode,
            custom_start: config.initial_start_date,
            custom_end: config.initial_end_date,
            technician: config.initial_technician.clone(),
            municipalities: normalize_names(config.initial_municipalities.iter()),
            selected_regions: normalize_names(config.initial_regions.iter()),
            action: config.initial_action.clone(),
        };
        let has_explicit_range = intent.custom_start.is_some() || intent.custom_end.is_some();
        if !intent.date_mode.is_custom() && !has_explicit_range {
            intent.snapshot_preset(now);
        }
        intent
    }

    pub fn is_custom_date_mode(&self) -> bool {
        self.date_mode.is_custom()
    }

    /// Copy the active preset's interval into the custom range.
    pub(crate) fn snapshot_preset(&mut self, now: NaiveDateTime) {
        let interval = presets::resolve(self.date_mode, now);
        self.custom_start = interval.start;
        self.custom_end = interval.end;
    }
}

/// Trim names and drop blanks; the set collapses duplicates.
pub(crate) fn normalize_names<'a, I>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    names
        .into_iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lifecycle of the most recent commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStatus {
    #[default]
    Idle,
    Dirty,
    Applying,
    Applied,
    Error,
}

impl ApplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyStatus::Idle => "idle",
            ApplyStatus::Dirty => "dirty",
            ApplyStatus::Applying => "applying",
            ApplyStatus::Applied => "applied",
            ApplyStatus::Error => "error",
        }
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status fields the host view renders next to the filter bar.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyState {
    pub status: ApplyStatus,
    pub last_applied_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    /// Query delivered by the newest successful commit.
    pub last_applied: Option<EffectiveQuery>,
    /// Commit sequence number of `last_applied`; 0 before the first success.
    pub applied_sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_datetime;

    #[test]
    fn test_selection_sentinel() {
        assert_eq!(Selection::from("all"), Selection::All);
        assert_eq!(Selection::from("  "), Selection::All);
        assert_eq!(Selection::from(" t-1 "), Selection::Only("t-1".to_string()));
        assert_eq!(Selection::only("t-1").value(), Some("t-1"));
        assert_eq!(Selection::All.value(), None);
    }

    #[test]
    fn test_selection_serializes_as_string() {
        assert_eq!(serde_json::to_string(&Selection::All).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&Selection::only("t-9")).unwrap(), "\"t-9\"");
        let parsed: Selection = serde_json::from_str("\"install\"").unwrap();
        assert_eq!(parsed, Selection::only("install"));
    }

    #[test]
    fn test_default_intent() {
        let intent = FilterIntent::default();
        assert_eq!(intent.date_mode, DateMode::Last7Days);
        assert!(intent.technician.is_all());
        assert!(intent.action.is_all());
        assert!(intent.municipalities.is_empty());
        assert!(intent.selected_regions.is_empty());
        assert!(!intent.is_custom_date_mode());
    }

    #[test]
    fn test_seeded_snapshots_preset() {
        let now = parse_datetime("2024-05-10T12:00:00").unwrap();
        let intent = FilterIntent::seeded(&EngineConfig::default(), now);
        assert_eq!(intent.custom_start, Some(parse_datetime("2024-05-03T12:00:00").unwrap()));
        assert_eq!(intent.custom_end, Some(now));
    }

    #[test]
    fn test_seeded_keeps_explicit_range() {
        let now = parse_datetime("2024-05-10T12:00:00").unwrap();
        let config = EngineConfig {
            initial_date_mode: DateMode::Custom,
            initial_start_date: Some(parse_datetime("2024-01-01").unwrap()),
            initial_end_date: Some(parse_datetime("2024-01-31").unwrap()),
            initial_municipalities: vec![" Niš ".to_string(), "Niš".to_string(), String::new()],
            ..EngineConfig::default()
        };
        let intent = FilterIntent::seeded(&config, now);
        assert!(intent.is_custom_date_mode());
        assert_eq!(intent.custom_start, config.initial_start_date);
        assert_eq!(intent.custom_end, config.initial_end_date);
        assert_eq!(intent.municipalities.len(), 1);
    }
}
