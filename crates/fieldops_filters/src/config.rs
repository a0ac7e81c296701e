//! Engine configuration.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::clock::parse_datetime;
use crate::error::{FilterError, Result};
use crate::intent::Selection;
use crate::presets::DateMode;

/// Default trailing-edge debounce for auto-apply.
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

/// How mutations turn into commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// Every mutation schedules a debounced commit.
    #[default]
    Auto,
    /// Mutations only mark the intent dirty; `apply_filters` commits.
    Manual,
}

impl ApplyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyMode::Auto => "auto",
            ApplyMode::Manual => "manual",
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ApplyMode {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "auto" => Ok(ApplyMode::Auto),
            "manual" => Ok(ApplyMode::Manual),
            other => Err(FilterError::InvalidValue {
                key: "mode".to_string(),
                value: other.to_string(),
                reason: "expected 'auto' or 'manual'".to_string(),
            }),
        }
    }
}

/// Options a consuming view passes when mounting the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_date_mode: DateMode,

    #[serde(deserialize_with = "deserialize_opt_datetime")]
    pub initial_start_date: Option<NaiveDateTime>,

    #[serde(deserialize_with = "deserialize_opt_datetime")]
    pub initial_end_date: Option<NaiveDateTime>,

    pub initial_technician: Selection,

    pub initial_municipalities: Vec<String>,

    /// Regions selected at mount time.
    pub initial_regions: Vec<String>,

    pub initial_action: Selection,

    /// Auto-apply debounce delay in milliseconds.
    pub debounce_ms: u64,

    pub mode: ApplyMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_date_mode: DateMode::default(),
            initial_start_date: None,
            initial_end_date: None,
            initial_technician: Selection::All,
            initial_municipalities: Vec::new(),
            initial_regions: Vec::new(),
            initial_action: Selection::All,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            mode: ApplyMode::default(),
        }
    }
}

impl EngineConfig {
    pub fn manual() -> Self {
        Self {
            mode: ApplyMode::Manual,
            ..Self::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| FilterError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FilterError::Config(e.to_string()))
    }
}

/// Accepts `YYYY-MM-DD` as well as full date-times for optional fields.
pub(crate) fn deserialize_opt_datetime<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_datetime(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
