//! Unified filter/query engine for FieldOps dashboards and reports.
//!
//! The engine reconciles the filter bar's overlapping inputs (date preset or
//! custom range, technician, explicit municipalities, region shortcuts and
//! action) into one canonical [`EffectiveQuery`], and hands it to the data
//! layer through a debounced commit protocol that never lets an older, slower
//! commit overwrite a newer one.
//!
//! # Architecture
//!
//! - `presets` - date preset registry, pure `(mode, now) -> Interval`
//! - `regions` - static region table and municipality expansion
//! - `intent` / `store` - raw filter state and its only writer
//! - `query` / `summary` - pure projections of an intent
//! - `engine` - commit controller (debounce, supersession, status)
//! - `command` - engine operations as serde data
//! - `config` - mount-time options, TOML loadable
//!
//! # Example
//!
//! ```ignore
//! use fieldops_filters::{EngineConfig, FilterEngine, FilterUpdate, Selection};
//!
//! let engine = FilterEngine::new(EngineConfig::default(), |query| async move {
//!     api.fetch_work_orders(&query).await
//! })?;
//! engine.update_filter(FilterUpdate::Technician(Selection::only("t-17")));
//! engine.toggle_region("Beograd");
//! // One debounced call to the consumer follows 150ms after the last edit.
//! ```

pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod intent;
pub mod presets;
pub mod query;
pub mod regions;
pub mod store;
pub mod summary;

pub use clock::{parse_datetime, Clock, FixedClock, SystemClock};
pub use command::FilterCommand;
pub use config::{ApplyMode, EngineConfig, DEFAULT_DEBOUNCE_MS};
pub use engine::{CommitOutcome, ConsumerFuture, FilterEngine, FilterSnapshot, QueryConsumer};
pub use error::{FilterError, Result};
pub use intent::{ApplyState, ApplyStatus, FilterIntent, Selection};
pub use presets::{DateMode, Interval};
pub use query::{materialize, EffectiveQuery};
pub use regions::Region;
pub use store::{FilterPatch, FilterStore, FilterUpdate};
pub use summary::{project, FilterSummary};
