//! Query materialization.
//!
//! Turns a [`FilterIntent`] into the canonical [`EffectiveQuery`] handed to the
//! data layer. Recomputed on every commit and every read; nothing is cached.
//!
//! Dates always come from `custom_start`/`custom_end`, whatever the date mode.
//! Presets are resolved once, when they are selected or seeded, so a range
//! handed over by a drill-down view reaches the consumer untouched.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::intent::{FilterIntent, Selection};
use crate::presets::Interval;
use crate::regions;

const WIRE_DATETIME: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Fully resolved query: concrete dates and a deduplicated municipality set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveQuery {
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub technician: Selection,
    pub municipalities: BTreeSet<String>,
    pub action: Selection,
}

impl EffectiveQuery {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start_date, self.end_date)
    }

    /// GET-parameter form for HTTP collaborators. `all` selections and an
    /// empty municipality set are omitted.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start_date {
            pairs.push(("startDate", start.format(WIRE_DATETIME).to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("endDate", end.format(WIRE_DATETIME).to_string()));
        }
        if let Some(technician) = self.technician.value() {
            pairs.push(("technician", technician.to_string()));
        }
        if !self.municipalities.is_empty() {
            let joined: Vec<&str> = self.municipalities.iter().map(String::as_str).collect();
            pairs.push(("municipalities", joined.join(",")));
        }
        if let Some(action) = self.action.value() {
            pairs.push(("action", action.to_string()));
        }
        pairs
    }
}

/// Date interval the intent selects. Mode-agnostic: the date mode only
/// picks a label.
pub fn effective_interval(intent: &FilterIntent) -> Interval {
    Interval::new(intent.custom_start, intent.custom_end)
}

/// Explicit municipalities plus every municipality of the selected regions.
pub fn effective_municipalities(intent: &FilterIntent) -> BTreeSet<String> {
    let mut municipalities = regions::expand(&intent.selected_regions);
    municipalities.extend(intent.municipalities.iter().cloned());
    municipalities
}

pub fn materialize(intent: &FilterIntent) -> EffectiveQuery {
    let interval = effective_interval(intent);
    EffectiveQuery {
        start_date: interval.start,
        end_date: interval.end,
        technician: intent.technician.clone(),
        municipalities: effective_municipalities(intent),
        action: intent.action.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_datetime;
    use crate::presets::DateMode;

    fn at(value: &str) -> NaiveDateTime {
        parse_datetime(value).unwrap()
    }

    #[test]
    fn test_union_of_explicit_and_region() {
        let mut intent = FilterIntent::default();
        intent.municipalities.insert("Niš".to_string());
        intent.selected_regions.insert("Beograd".to_string());

        let query = materialize(&intent);
        assert_eq!(query.municipalities.len(), 11);
        assert!(query.municipalities.contains("Niš"));
        for name in regions::find("Beograd").unwrap().municipalities {
            assert!(query.municipalities.contains(*name));
        }
    }

    #[test]
    fn test_explicit_overlap_with_region_collapses() {
        let mut intent = FilterIntent::default();
        intent.municipalities.insert("Zemun".to_string());
        intent.selected_regions.insert("Beograd".to_string());
        assert_eq!(effective_municipalities(&intent).len(), 10);
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let mut intent = FilterIntent::default();
        intent.municipalities.insert("zemun".to_string());
        intent.selected_regions.insert("Beograd".to_string());
        assert_eq!(effective_municipalities(&intent).len(), 11);
    }

    #[test]
    fn test_preset_dates_come_from_snapshot() {
        let mut intent = FilterIntent {
            date_mode: DateMode::Last24Hours,
            ..FilterIntent::default()
        };
        intent.snapshot_preset(at("2024-05-10T08:00:00"));
        let query = materialize(&intent);
        assert_eq!(query.start_date, Some(at("2024-05-09T08:00:00")));
        assert_eq!(query.end_date, Some(at("2024-05-10T08:00:00")));
    }

    #[test]
    fn test_preset_mode_keeps_handed_over_dates() {
        let intent = FilterIntent {
            date_mode: DateMode::Last7Days,
            custom_start: Some(at("2024-05-01T09:00:00")),
            custom_end: Some(at("2024-05-08T09:00:00")),
            ..FilterIntent::default()
        };
        let query = materialize(&intent);
        assert_eq!(query.start_date, Some(at("2024-05-01T09:00:00")));
        assert_eq!(query.end_date, Some(at("2024-05-08T09:00:00")));
    }

    #[test]
    fn test_custom_dates_come_from_intent() {
        let intent = FilterIntent {
            date_mode: DateMode::Custom,
            custom_start: Some(at("2024-01-05")),
            custom_end: None,
            ..FilterIntent::default()
        };
        let query = materialize(&intent);
        assert_eq!(query.start_date, Some(at("2024-01-05")));
        assert_eq!(query.end_date, None);
    }

    #[test]
    fn test_materialize_is_deterministic() {
        let mut intent = FilterIntent::default();
        intent.selected_regions.insert("Vojvodina".to_string());
        intent.technician = Selection::only("t-4");
        intent.snapshot_preset(at("2024-05-10T10:00:00"));
        assert_eq!(materialize(&intent), materialize(&intent));
    }

    #[test]
    fn test_query_pairs() {
        let query = EffectiveQuery {
            start_date: Some(at("2024-04-01")),
            end_date: Some(at("2024-06-30T23:59:59.999")),
            technician: Selection::All,
            municipalities: ["Niš", "Bor"].iter().map(|m| m.to_string()).collect(),
            action: Selection::only("install"),
        };
        let pairs = query.to_query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("startDate", "2024-04-01T00:00:00.000".to_string()),
                ("endDate", "2024-06-30T23:59:59.999".to_string()),
                ("municipalities", "Bor,Niš".to_string()),
                ("action", "install".to_string()),
            ]
        );
    }

    #[test]
    fn test_json_shape_is_camel_case() {
        let mut intent = FilterIntent::default();
        intent.snapshot_preset(at("2024-05-10"));
        let query = materialize(&intent);
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["technician"], "all");
        assert!(value.get("startDate").is_some());
        assert!(value["municipalities"].as_array().unwrap().is_empty());
    }
}
