//! `fieldops regions`: the region registry.

use anyhow::Result;
use fieldops_filters::regions::{self, Region};
use serde::Serialize;

use super::output::{print_json, print_table};

#[derive(Debug)]
pub struct RegionsArgs {
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegionView {
    key: &'static str,
    label: &'static str,
    municipalities: &'static [&'static str],
}

impl From<&'static Region> for RegionView {
    fn from(region: &'static Region) -> Self {
        Self {
            key: region.key,
            label: region.label,
            municipalities: region.municipalities,
        }
    }
}

pub fn run(args: RegionsArgs) -> Result<()> {
    if args.json {
        let views: Vec<RegionView> = regions::regions().iter().map(RegionView::from).collect();
        return print_json(&views);
    }

    let rows: Vec<Vec<String>> = regions::regions()
        .iter()
        .map(|region| {
            vec![
                region.key.to_string(),
                region.label.to_string(),
                region.municipalities.len().to_string(),
                region.municipalities.join(", "),
            ]
        })
        .collect();
    print_table(&["key", "label", "count", "municipalities"], rows);
    Ok(())
}
