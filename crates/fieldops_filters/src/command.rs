//! Engine operations expressed as data.
//!
//! Host views that forward UI events over a channel, and the CLI replay
//! command, describe each edit as a [`FilterCommand`] and dispatch it with
//! [`FilterCommand::run`].

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::ApplyMode;
use crate::engine::{CommitOutcome, FilterEngine};
use crate::error::Result;
use crate::store::{FilterPatch, FilterUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterCommand {
    UpdateFilter { key: String, value: String },
    UpdateMunicipalities { municipalities: Vec<String> },
    AddMunicipality { name: String },
    RemoveMunicipality { name: String },
    ToggleRegion { key: String },
    ResetFilters,
    Sync { patch: FilterPatch },
    Apply,
    SetMode { mode: ApplyMode },
}

impl FilterCommand {
    pub fn name(&self) -> &'static str {
        match self {
            FilterCommand::UpdateFilter { .. } => "update_filter",
            FilterCommand::UpdateMunicipalities { .. } => "update_municipalities",
            FilterCommand::AddMunicipality { .. } => "add_municipality",
            FilterCommand::RemoveMunicipality { .. } => "remove_municipality",
            FilterCommand::ToggleRegion { .. } => "toggle_region",
            FilterCommand::ResetFilters => "reset_filters",
            FilterCommand::Sync { .. } => "sync",
            FilterCommand::Apply => "apply",
            FilterCommand::SetMode { .. } => "set_mode",
        }
    }

    /// Dispatch to the engine. `apply` runs as a spawned task whose handle is
    /// returned; every other command completes synchronously.
    ///
    /// Only `update_filter` can fail, when its key or value does not parse.
    pub fn run(self, engine: &FilterEngine) -> Result<Option<JoinHandle<CommitOutcome>>> {
        match self {
            FilterCommand::UpdateFilter { key, value } => {
                engine.update_filter(FilterUpdate::from_key_value(&key, &value)?);
            }
            FilterCommand::UpdateMunicipalities { municipalities } => {
                engine.update_municipalities(&municipalities);
            }
            FilterCommand::AddMunicipality { name } => engine.add_municipality(&name),
            FilterCommand::RemoveMunicipality { name } => engine.remove_municipality(&name),
            FilterCommand::ToggleRegion { key } => engine.toggle_region(&key),
            FilterCommand::ResetFilters => engine.reset_filters(),
            FilterCommand::Sync { patch } => engine.sync_with_external_state(patch),
            FilterCommand::Apply => return Ok(Some(engine.spawn_apply())),
            FilterCommand::SetMode { mode } => engine.set_mode(mode),
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{parse_datetime, FixedClock};
    use crate::config::EngineConfig;
    use crate::error::FilterError;
    use crate::intent::{ApplyStatus, Selection};
    use crate::query::EffectiveQuery;

    fn engine() -> FilterEngine {
        let clock = FixedClock::new(parse_datetime("2024-05-10T12:00:00").unwrap());
        FilterEngine::with_clock(
            EngineConfig::manual(),
            |_query: EffectiveQuery| async { Ok::<(), anyhow::Error>(()) },
            clock,
        )
        .unwrap()
    }

    #[test]
    fn test_decode_commands() {
        let command: FilterCommand =
            serde_json::from_str(r#"{"op":"update_filter","key":"technician","value":"t-3"}"#)
                .unwrap();
        assert_eq!(
            command,
            FilterCommand::UpdateFilter {
                key: "technician".to_string(),
                value: "t-3".to_string()
            }
        );

        let command: FilterCommand = serde_json::from_str(r#"{"op":"reset_filters"}"#).unwrap();
        assert_eq!(command, FilterCommand::ResetFilters);

        let command: FilterCommand =
            serde_json::from_str(r#"{"op":"sync","patch":{"selectedRegions":["Jug"]}}"#).unwrap();
        assert_eq!(command.name(), "sync");

        let command: FilterCommand =
            serde_json::from_str(r#"{"op":"set_mode","mode":"auto"}"#).unwrap();
        assert_eq!(command, FilterCommand::SetMode { mode: ApplyMode::Auto });
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        assert!(serde_json::from_str::<FilterCommand>(r#"{"op":"explode"}"#).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_dispatches_to_engine() {
        let engine = engine();
        FilterCommand::ToggleRegion { key: "Beograd".to_string() }
            .run(&engine)
            .unwrap();
        FilterCommand::UpdateFilter {
            key: "action".to_string(),
            value: "install".to_string(),
        }
        .run(&engine)
        .unwrap();

        let intent = engine.intent();
        assert!(intent.selected_regions.contains("Beograd"));
        assert_eq!(intent.action, Selection::only("install"));
        assert_eq!(engine.status(), ApplyStatus::Dirty);

        let handle = FilterCommand::Apply.run(&engine).unwrap().unwrap();
        assert_eq!(handle.await.unwrap(), CommitOutcome::Applied);
        assert_eq!(engine.status(), ApplyStatus::Applied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_update_reports_error() {
        let engine = engine();
        let result = FilterCommand::UpdateFilter {
            key: "colour".to_string(),
            value: "red".to_string(),
        }
        .run(&engine);
        assert!(matches!(result, Err(FilterError::UnknownFilterKey(_))));
        assert_eq!(engine.status(), ApplyStatus::Idle);
    }
}
