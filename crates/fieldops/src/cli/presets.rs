//! `fieldops presets`: every date preset resolved against one instant.

use anyhow::Result;
use chrono::NaiveDateTime;
use fieldops_filters::presets::{self, DateMode, Interval};
use fieldops_filters::Clock;
use serde::Serialize;

use super::output::{format_bound, print_json, print_table};

#[derive(Debug)]
pub struct PresetsArgs {
    pub now: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPreset {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub range: Interval,
}

pub fn resolve_all(now: NaiveDateTime) -> Vec<ResolvedPreset> {
    DateMode::ALL
        .iter()
        .map(|mode| ResolvedPreset {
            key: mode.as_str(),
            label: mode.label(),
            range: presets::resolve(*mode, now),
        })
        .collect()
}

pub fn run(args: PresetsArgs) -> Result<()> {
    let now = super::clock_for(args.now.as_deref())?.now();
    let resolved = resolve_all(now);

    if args.json {
        return print_json(&resolved);
    }

    let rows: Vec<Vec<String>> = resolved
        .into_iter()
        .map(|preset| {
            vec![
                preset.key.to_string(),
                preset.label.to_string(),
                format_bound(preset.range.start),
                format_bound(preset.range.end),
            ]
        })
        .collect();
    print_table(&["key", "label", "start", "end"], rows);
    Ok(())
}
