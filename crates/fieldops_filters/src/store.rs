//! Filter store: the only writer of a [`FilterIntent`].
//!
//! Every mutator is synchronous and infallible. Each returns `true` when the
//! intent actually changed, which bumps the store revision; the engine uses
//! that to decide whether a commit is needed. A mutation that changes nothing
//! requests no commit, while `reset_filters` on the engine always requests one.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::clock::parse_datetime;
use crate::config::deserialize_opt_datetime;
use crate::error::{FilterError, Result};
use crate::intent::{normalize_names, FilterIntent, Selection};
use crate::presets::DateMode;

/// A single-field edit from the filter bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    DateMode(DateMode),
    CustomStart(Option<NaiveDateTime>),
    CustomEnd(Option<NaiveDateTime>),
    CustomRange {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
    Technician(Selection),
    Action(Selection),
}

impl FilterUpdate {
    /// Parse the untyped `(key, value)` form used by scripted callers.
    ///
    /// Unknown date modes fall back to `7d`, like every other preset lookup.
    /// An empty value clears a custom bound.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self> {
        match key {
            "dateMode" | "date_mode" => Ok(FilterUpdate::DateMode(DateMode::from_key_or_default(value))),
            "customStart" | "custom_start" => parse_bound(key, value).map(FilterUpdate::CustomStart),
            "customEnd" | "custom_end" => parse_bound(key, value).map(FilterUpdate::CustomEnd),
            "technician" => Ok(FilterUpdate::Technician(Selection::from(value))),
            "action" => Ok(FilterUpdate::Action(Selection::from(value))),
            other => Err(FilterError::UnknownFilterKey(other.to_string())),
        }
    }
}

fn parse_bound(key: &str, value: &str) -> Result<Option<NaiveDateTime>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_datetime(value).map(Some).map_err(|e| FilterError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Fields handed back by another view; absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_mode: Option<DateMode>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_opt_datetime"
    )]
    pub custom_start: Option<NaiveDateTime>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_opt_datetime"
    )]
    pub custom_end: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician: Option<Selection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_regions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Selection>,
}

impl FilterPatch {
    pub fn is_empty(&self) -> bool {
        *self == FilterPatch::default()
    }
}

impl From<&FilterIntent> for FilterPatch {
    fn from(intent: &FilterIntent) -> Self {
        Self {
            date_mode: Some(intent.date_mode),
            custom_start: intent.custom_start,
            custom_end: intent.custom_end,
            technician: Some(intent.technician.clone()),
            municipalities: Some(intent.municipalities.iter().cloned().collect()),
            selected_regions: Some(intent.selected_regions.iter().cloned().collect()),
            action: Some(intent.action.clone()),
        }
    }
}

/// Owns one filter intent and its revision counter.
#[derive(Debug, Clone)]
pub struct FilterStore {
    intent: FilterIntent,
    revision: u64,
}

impl FilterStore {
    pub fn new(intent: FilterIntent) -> Self {
        Self {
            intent,
            revision: 0,
        }
    }

    pub fn intent(&self) -> &FilterIntent {
        &self.intent
    }

    /// Incremented on every change to the intent.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Set one field. Switching to a preset snapshots its interval into the
    /// custom range; switching to `custom` leaves the range as it was.
    pub fn update_filter(&mut self, update: FilterUpdate, now: NaiveDateTime) -> bool {
        self.edit(|intent| match update {
            FilterUpdate::DateMode(mode) => {
                intent.date_mode = mode;
                if !mode.is_custom() {
                    intent.snapshot_preset(now);
                }
            }
            FilterUpdate::CustomStart(start) => intent.custom_start = start,
            FilterUpdate::CustomEnd(end) => intent.custom_end = end,
            FilterUpdate::CustomRange { start, end } => {
                intent.custom_start = start;
                intent.custom_end = end;
            }
            FilterUpdate::Technician(technician) => intent.technician = technician,
            FilterUpdate::Action(action) => intent.action = action,
        })
    }

    pub fn update_municipalities(&mut self, municipalities: &[String]) -> bool {
        let replacement = normalize_names(municipalities.iter());
        self.edit(|intent| intent.municipalities = replacement)
    }

    pub fn add_municipality(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.intent.municipalities.contains(name) {
            return false;
        }
        self.edit(|intent| {
            intent.municipalities.insert(name.to_string());
        })
    }

    pub fn remove_municipality(&mut self, name: &str) -> bool {
        if !self.intent.municipalities.contains(name.trim()) {
            return false;
        }
        self.edit(|intent| {
            intent.municipalities.remove(name.trim());
        })
    }

    pub fn toggle_region(&mut self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        self.edit(|intent| {
            if !intent.selected_regions.remove(key) {
                intent.selected_regions.insert(key.to_string());
            }
        })
    }

    /// Replace the intent wholesale with `seed`.
    pub fn reset(&mut self, seed: FilterIntent) -> bool {
        self.edit(|intent| *intent = seed)
    }

    /// Merge only the fields present in `patch`. Dates in the patch are kept
    /// as given; a switch to another preset without dates resolves it at `now`.
    pub fn sync_with_external_state(&mut self, patch: FilterPatch, now: NaiveDateTime) -> bool {
        self.edit(|intent| {
            if let Some(mode) = patch.date_mode {
                let has_dates = patch.custom_start.is_some() || patch.custom_end.is_some();
                let switched = mode != intent.date_mode;
                intent.date_mode = mode;
                if switched && !mode.is_custom() && !has_dates {
                    intent.snapshot_preset(now);
                }
            }
            if let Some(start) = patch.custom_start {
                intent.custom_start = Some(start);
            }
            if let Some(end) = patch.custom_end {
                intent.custom_end = Some(end);
            }
            if let Some(technician) = patch.technician {
                intent.technician = technician;
            }
            if let Some(municipalities) = patch.municipalities {
                intent.municipalities = normalize_names(municipalities.iter());
            }
            if let Some(regions) = patch.selected_regions {
                intent.selected_regions = normalize_names(regions.iter());
            }
            if let Some(action) = patch.action {
                intent.action = action;
            }
        })
    }

    fn edit(&mut self, apply: impl FnOnce(&mut FilterIntent)) -> bool {
        let before = self.intent.clone();
        apply(&mut self.intent);
        let changed = self.intent != before;
        if changed {
            self.revision += 1;
        }
        changed
    }
}
