//! Subcommands of the `fieldops` binary.

pub mod config;
pub mod output;
pub mod presets;
pub mod query;
pub mod regions;
pub mod replay;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use fieldops_filters::{parse_datetime, Clock, FixedClock, SystemClock};

/// Current-thread runtime for commands that drive an engine.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start async runtime")
}

/// `--now` pins the clock; otherwise local wall-clock time.
pub fn clock_for(now: Option<&str>) -> Result<Box<dyn Clock>> {
    match now {
        Some(value) => Ok(Box::new(FixedClock::new(parse_now(value)?))),
        None => Ok(Box::new(SystemClock)),
    }
}

pub fn parse_now(value: &str) -> Result<NaiveDateTime> {
    parse_datetime(value).with_context(|| format!("Invalid --now value '{}'", value))
}
