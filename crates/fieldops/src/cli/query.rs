//! `fieldops query`: resolve one filter selection into the query the data
//! layer would receive.

use anyhow::{bail, Context, Result};
use fieldops_filters::{
    parse_datetime, ApplyMode, CommitOutcome, DateMode, EffectiveQuery, EngineConfig,
    FilterEngine, FilterSummary, Selection,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use super::output::{format_bound, print_json, print_table};

#[derive(Debug, Default)]
pub struct QueryArgs {
    pub preset: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub technician: Option<String>,
    pub municipalities: Vec<String>,
    pub regions: Vec<String>,
    pub action: Option<String>,
    pub now: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReport {
    pub query: EffectiveQuery,
    pub params: Vec<(&'static str, String)>,
    pub summary: FilterSummary,
}

/// Overlay command-line filters onto the configured seed. A `--from` or
/// `--to` without `--preset` selects the custom range; with any other preset
/// it is rejected.
pub fn seed_config(mut config: EngineConfig, args: &QueryArgs) -> Result<EngineConfig> {
    let has_range = args.from.is_some() || args.to.is_some();
    if let Some(preset) = &args.preset {
        config.initial_date_mode = preset
            .parse::<DateMode>()
            .with_context(|| format!("Invalid --preset '{}'", preset))?;
        if has_range && !config.initial_date_mode.is_custom() {
            bail!("--from/--to need --preset custom, got '{}'", preset);
        }
    } else if has_range {
        config.initial_date_mode = DateMode::Custom;
    }
    if let Some(from) = &args.from {
        config.initial_start_date = Some(
            parse_datetime(from).with_context(|| format!("Invalid --from value '{}'", from))?,
        );
    }
    if let Some(to) = &args.to {
        config.initial_end_date =
            Some(parse_datetime(to).with_context(|| format!("Invalid --to value '{}'", to))?);
    }
    if let Some(technician) = &args.technician {
        config.initial_technician = Selection::from(technician.as_str());
    }
    if !args.municipalities.is_empty() {
        config.initial_municipalities = args.municipalities.clone();
    }
    if !args.regions.is_empty() {
        config.initial_regions = args.regions.clone();
    }
    if let Some(action) = &args.action {
        config.initial_action = Selection::from(action.as_str());
    }
    config.mode = ApplyMode::Manual;
    Ok(config)
}

/// Mount a manual-mode engine, apply once and capture what the consumer saw.
pub async fn resolve(config: EngineConfig, args: &QueryArgs) -> Result<QueryReport> {
    let config = seed_config(config, args)?;
    let captured: Arc<Mutex<Option<EffectiveQuery>>> = Arc::default();
    let sink = Arc::clone(&captured);
    let consumer = move |query: EffectiveQuery| {
        let sink = Arc::clone(&sink);
        async move {
            *sink.lock().map_err(|_| anyhow::anyhow!("capture lock poisoned"))? = Some(query);
            Ok::<(), anyhow::Error>(())
        }
    };

    let clock = super::clock_for(args.now.as_deref())?;
    let engine = FilterEngine::with_clock(config, consumer, clock)?;
    match engine.apply_filters().await {
        CommitOutcome::Applied => {}
        other => bail!("Query was not applied: {:?}", other),
    }

    let query = captured
        .lock()
        .map_err(|_| anyhow::anyhow!("capture lock poisoned"))?
        .take()
        .context("Consumer never received a query")?;
    Ok(QueryReport {
        params: query.to_query_pairs(),
        summary: engine.summary(),
        query,
    })
}

pub async fn run(config: EngineConfig, args: QueryArgs) -> Result<()> {
    let report = resolve(config, &args).await?;
    if args.json {
        return print_json(&report);
    }

    let query = &report.query;
    let summary = &report.summary;
    let municipalities = if query.municipalities.is_empty() {
        "all".to_string()
    } else {
        query.municipalities.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    print_table(
        &["filter", "value"],
        vec![
            vec!["date".to_string(), summary.date_range_label.clone()],
            vec!["start".to_string(), format_bound(query.start_date)],
            vec!["end".to_string(), format_bound(query.end_date)],
            vec!["technician".to_string(), query.technician.to_string()],
            vec!["regions".to_string(), summary.regions.join(", ")],
            vec![
                format!("municipalities ({})", summary.municipality_count),
                municipalities,
            ],
            vec!["action".to_string(), query.action.to_string()],
            vec![
                "active filters".to_string(),
                summary.active_filter_count().to_string(),
            ],
        ],
    );

    let params: Vec<String> = report
        .params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    println!("{}", params.join("&"));
    Ok(())
}
