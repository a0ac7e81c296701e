//! Static region registry.
//!
//! A region is a shortcut in the filter bar that stands for a fixed list of
//! municipalities. The table is domain data and never changes at runtime.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// A named group of municipalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub key: &'static str,
    pub label: &'static str,
    pub municipalities: &'static [&'static str],
}

const REGIONS: &[Region] = &[
    Region {
        key: "Beograd",
        label: "Beograd",
        municipalities: &[
            "Novi Beograd",
            "Zemun",
            "Vračar",
            "Stari Grad",
            "Savski Venac",
            "Voždovac",
            "Zvezdara",
            "Palilula",
            "Čukarica",
            "Rakovica",
        ],
    },
    Region {
        key: "Vojvodina",
        label: "Vojvodina",
        municipalities: &[
            "Novi Sad",
            "Subotica",
            "Zrenjanin",
            "Pančevo",
            "Sombor",
            "Kikinda",
            "Sremska Mitrovica",
            "Vršac",
        ],
    },
    Region {
        key: "Sumadija",
        label: "Šumadija i Zapadna Srbija",
        municipalities: &[
            "Kragujevac",
            "Čačak",
            "Kraljevo",
            "Kruševac",
            "Užice",
            "Valjevo",
            "Šabac",
            "Novi Pazar",
        ],
    },
    Region {
        key: "Jug",
        label: "Južna i Istočna Srbija",
        municipalities: &[
            "Niš",
            "Leskovac",
            "Vranje",
            "Pirot",
            "Zaječar",
            "Požarevac",
            "Bor",
        ],
    },
];

/// All registered regions in display order.
pub fn regions() -> &'static [Region] {
    REGIONS
}

pub fn find(key: &str) -> Option<&'static Region> {
    REGIONS.iter().find(|region| region.key == key)
}

/// Display label for a region key; unknown keys are shown as-is.
pub fn region_label(key: &str) -> &str {
    find(key).map(|region| region.label).unwrap_or(key)
}

/// Union of the municipalities of every known region in `keys`.
///
/// Unknown keys are skipped. Duplicates collapse by exact string equality.
pub fn expand<'a, I>(keys: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut municipalities = BTreeSet::new();
    for key in keys {
        match find(key) {
            Some(region) => {
                municipalities.extend(region.municipalities.iter().map(|m| (*m).to_string()));
            }
            None => debug!(region = %key, "ignoring unknown region"),
        }
    }
    municipalities
}

/// Keys of every region that contains `municipality`.
pub fn regions_containing(municipality: &str) -> Vec<&'static str> {
    REGIONS
        .iter()
        .filter(|region| region.municipalities.contains(&municipality))
        .map(|region| region.key)
        .collect()
}
