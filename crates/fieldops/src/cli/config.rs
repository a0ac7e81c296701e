//! CLI configuration file.
//!
//! ```toml
//! [filters]
//! initial_date_mode = "30d"
//! initial_regions = ["Beograd"]
//! debounce_ms = 250
//! mode = "auto"
//! ```

use anyhow::{Context, Result};
use fieldops_filters::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOpsConfig {
    #[serde(default)]
    pub filters: EngineConfig,
}

impl FieldOpsConfig {
    /// Explicit `--config` path, else `$FIELDOPS_HOME/config.toml` when it
    /// exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => {
                let path = default_config_path();
                if path.is_file() {
                    Self::read(&path)
                } else {
                    debug!(path = %path.display(), "no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

pub fn default_config_path() -> PathBuf {
    fieldops_logging::fieldops_home().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_filters::{ApplyMode, DateMode};
    use std::io::Write;

    #[test]
    fn test_load_filters_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[filters]\ninitial_date_mode = \"quarter\"\ninitial_regions = [\"Jug\"]\nmode = \"manual\""
        )
        .unwrap();

        let config = FieldOpsConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.filters.initial_date_mode, DateMode::Quarter);
        assert_eq!(config.filters.initial_regions, vec!["Jug".to_string()]);
        assert_eq!(config.filters.mode, ApplyMode::Manual);
        assert_eq!(config.filters.debounce_ms, 150);
    }

    #[test]
    fn test_missing_table_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# nothing here").unwrap();
        let config = FieldOpsConfig::load(Some(file.path())).unwrap();
        assert_eq!(config, FieldOpsConfig::default());
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = FieldOpsConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
