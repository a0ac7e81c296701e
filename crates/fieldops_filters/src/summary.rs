//! Read-only projection used by result badges.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::intent::{FilterIntent, Selection};
use crate::presets::{DateMode, Interval};
use crate::query::{effective_interval, effective_municipalities};
use crate::regions;

const LABEL_DATE: &str = "%d.%m.%Y";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSummary {
    pub date_range_label: String,
    pub date_range: Interval,
    pub technician: Selection,
    /// Effective set, region expansion included.
    pub municipalities: BTreeSet<String>,
    pub municipality_count: usize,
    /// Labels of the selected regions.
    pub regions: Vec<String>,
    pub action: Selection,
    /// Date is always filtered and never counts here.
    pub has_active_filters: bool,
}

impl FilterSummary {
    /// Number of non-date filter badges to show.
    pub fn active_filter_count(&self) -> usize {
        [
            !self.technician.is_all(),
            !self.municipalities.is_empty(),
            !self.action.is_all(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }
}

pub fn project(intent: &FilterIntent) -> FilterSummary {
    let date_range = effective_interval(intent);
    let municipalities = effective_municipalities(intent);
    let has_active_filters =
        !intent.technician.is_all() || !municipalities.is_empty() || !intent.action.is_all();

    FilterSummary {
        date_range_label: date_range_label(intent.date_mode, &date_range),
        date_range,
        technician: intent.technician.clone(),
        municipality_count: municipalities.len(),
        municipalities,
        regions: intent
            .selected_regions
            .iter()
            .map(|key| regions::region_label(key).to_string())
            .collect(),
        action: intent.action.clone(),
        has_active_filters,
    }
}

fn date_range_label(mode: DateMode, range: &Interval) -> String {
    match (mode, range.start, range.end) {
        (DateMode::Custom, Some(start), Some(end)) => format!(
            "{} - {}",
            start.format(LABEL_DATE),
            end.format(LABEL_DATE)
        ),
        _ => mode.label().to_string(),
    }
}
