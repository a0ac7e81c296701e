//! `fieldops replay`: drive an engine from a scripted edit session.
//!
//! A script is JSON lines, one engine command per line, each stamped with the
//! millisecond offset at which it is issued:
//!
//! ```text
//! {"at_ms": 0,   "op": "toggle_region", "key": "Beograd"}
//! {"at_ms": 40,  "op": "update_filter", "key": "technician", "value": "t-17"}
//! {"at_ms": 900, "op": "apply"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Commands go to a
//! simulated backend with fixed latency, so debounce coalescing and commit
//! supersession can be watched from the terminal.

use anyhow::{bail, Context, Result};
use comfy_table::Cell;
use fieldops_filters::{
    ApplyStatus, CommitOutcome, ConsumerFuture, EffectiveQuery, EngineConfig,
    FilterCommand, FilterEngine, FilterSnapshot, QueryConsumer,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::output::{format_bound, print_json, print_table, status_cell};

#[derive(Debug)]
pub struct ReplayArgs {
    pub script: PathBuf,
    pub latency_ms: u64,
    pub fail_every: Option<u64>,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub command: FilterCommand,
}

/// Parse a replay script. Offsets must not decrease.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>> {
    let mut steps: Vec<ScriptStep> = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(line)
            .with_context(|| format!("Invalid script step on line {}", index + 1))?;
        if let Some(previous) = steps.last() {
            if step.at_ms < previous.at_ms {
                bail!(
                    "Script step on line {} goes back in time ({}ms after {}ms)",
                    index + 1,
                    step.at_ms,
                    previous.at_ms
                );
            }
        }
        steps.push(step);
    }
    Ok(steps)
}

// ============================================================================
// Simulated backend
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub latency: Duration,
    /// Every Nth call fails. Zero never fails.
    pub fail_every: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCall {
    pub call: u64,
    pub at_ms: u64,
    pub failed: bool,
    pub query: EffectiveQuery,
}

#[derive(Clone)]
struct SimulatedBackend {
    options: ReplayOptions,
    started: Instant,
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl SimulatedBackend {
    fn record(&self, query: EffectiveQuery) -> (u64, bool) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let call = calls.len() as u64 + 1;
        let failed = self.options.fail_every > 0 && call % self.options.fail_every == 0;
        calls.push(BackendCall {
            call,
            at_ms: elapsed_ms(self.started),
            failed,
            query,
        });
        (call, failed)
    }
}

impl QueryConsumer for SimulatedBackend {
    fn on_filters_change(&self, query: EffectiveQuery) -> ConsumerFuture {
        let backend = self.clone();
        Box::pin(async move {
            let (call, failed) = backend.record(query);
            debug!(call, failed, "simulated backend call");
            tokio::time::sleep(backend.options.latency).await;
            if failed {
                bail!("simulated backend failure on call {}", call);
            }
            Ok(())
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ============================================================================
// Replay
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub at_ms: u64,
    pub revision: u64,
    pub status: ApplyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub steps: usize,
    pub transitions: Vec<Transition>,
    pub calls: Vec<BackendCall>,
    /// Results of explicit `apply` steps, in script order.
    pub apply_outcomes: Vec<String>,
    pub final_status: ApplyStatus,
    pub last_error: Option<String>,
    pub last_applied: Option<EffectiveQuery>,
}

/// Nothing left to happen on its own: no commit in flight and no debounce
/// timer waiting to fire.
fn settled(snapshot: &FilterSnapshot) -> bool {
    !snapshot.commit_pending && snapshot.apply.status != ApplyStatus::Applying
}

pub async fn replay(
    config: EngineConfig,
    steps: Vec<ScriptStep>,
    options: ReplayOptions,
) -> Result<ReplayReport> {
    let started = Instant::now();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let backend = SimulatedBackend {
        options,
        started,
        calls: Arc::clone(&calls),
    };
    let engine = FilterEngine::new(config, backend)?;

    let mut updates = engine.subscribe();
    let watcher = tokio::spawn(async move {
        let mut seen: Vec<Transition> = Vec::new();
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            let unchanged = seen.last().map_or(false, |last| {
                last.status == snapshot.apply.status && last.revision == snapshot.revision
            });
            if !unchanged {
                seen.push(Transition {
                    at_ms: elapsed_ms(started),
                    revision: snapshot.revision,
                    status: snapshot.apply.status,
                    error: snapshot.apply.last_error,
                });
            }
        }
        seen
    });

    let step_count = steps.len();
    let mut applies = Vec::new();
    for (index, step) in steps.into_iter().enumerate() {
        tokio::time::sleep_until(started + Duration::from_millis(step.at_ms)).await;
        let name = step.command.name();
        debug!(step = index + 1, at_ms = step.at_ms, command = name, "replaying step");
        if let Some(handle) = step
            .command
            .run(&engine)
            .with_context(|| format!("Step {} ({}) was rejected", index + 1, name))?
        {
            applies.push(handle);
        }
    }

    let mut apply_outcomes = Vec::with_capacity(applies.len());
    for handle in applies {
        let outcome = handle.await.context("Apply task panicked")?;
        apply_outcomes.push(match outcome {
            CommitOutcome::Applied => "applied".to_string(),
            CommitOutcome::Failed(message) => format!("failed: {}", message),
            CommitOutcome::Superseded => "superseded".to_string(),
        });
    }

    let mut settle = engine.subscribe();
    settle
        .wait_for(settled)
        .await
        .context("Engine closed before settling")?;

    let final_state = engine.apply_state();
    drop(settle);
    drop(engine);
    let transitions = watcher.await.context("Status watcher panicked")?;

    let calls = std::mem::take(&mut *calls.lock().unwrap_or_else(PoisonError::into_inner));
    info!(steps = step_count, calls = calls.len(), status = %final_state.status, "replay finished");
    Ok(ReplayReport {
        steps: step_count,
        transitions,
        calls,
        apply_outcomes,
        final_status: final_state.status,
        last_error: final_state.last_error,
        last_applied: final_state.last_applied,
    })
}

pub async fn run(config: EngineConfig, args: ReplayArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script: {}", args.script.display()))?;
    let steps = parse_script(&text)?;
    let options = ReplayOptions {
        latency: Duration::from_millis(args.latency_ms),
        fail_every: args.fail_every.unwrap_or(0),
    };
    let report = replay(config, steps, options).await?;

    if args.json {
        return print_json(&report);
    }

    let transitions: Vec<Vec<Cell>> = report
        .transitions
        .iter()
        .map(|t| {
            vec![
                Cell::new(t.at_ms),
                Cell::new(t.revision),
                status_cell(t.status),
                Cell::new(t.error.as_deref().unwrap_or("")),
            ]
        })
        .collect();
    print_table(&["ms", "revision", "status", "error"], transitions);

    let calls: Vec<Vec<String>> = report
        .calls
        .iter()
        .map(|c| {
            vec![
                c.call.to_string(),
                c.at_ms.to_string(),
                (if c.failed { "failed" } else { "ok" }).to_string(),
                format_bound(c.query.start_date),
                format_bound(c.query.end_date),
                c.query.technician.to_string(),
                c.query.municipalities.len().to_string(),
                c.query.action.to_string(),
            ]
        })
        .collect();
    print_table(
        &["call", "ms", "result", "start", "end", "technician", "municipalities", "action"],
        calls,
    );

    println!(
        "{} steps, {} backend calls, final status {}",
        report.steps,
        report.calls.len(),
        report.final_status
    );
    if let Some(error) = &report.last_error {
        println!("last error: {}", error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_filters::{ApplyMode, Selection};

    fn technician_step(at_ms: u64, id: &str) -> ScriptStep {
        ScriptStep {
            at_ms,
            command: FilterCommand::UpdateFilter {
                key: "technician".to_string(),
                value: id.to_string(),
            },
        }
    }

    fn options(latency_ms: u64, fail_every: u64) -> ReplayOptions {
        ReplayOptions {
            latency: Duration::from_millis(latency_ms),
            fail_every,
        }
    }

    #[test]
    fn test_parse_script() {
        let text = r#"
# warm up
{"at_ms": 0, "op": "toggle_region", "key": "Beograd"}

{"at_ms": 40, "op": "update_filter", "key": "technician", "value": "t-17"}
{"at_ms": 40, "op": "apply"}
"#;
        let steps = parse_script(text).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[0].command,
            FilterCommand::ToggleRegion {
                key: "Beograd".to_string()
            }
        );
        assert_eq!(steps[2].at_ms, 40);
        assert_eq!(steps[2].command, FilterCommand::Apply);
    }

    #[test]
    fn test_parse_rejects_backwards_offsets() {
        let text = "{\"at_ms\": 50, \"op\": \"apply\"}\n{\"at_ms\": 10, \"op\": \"apply\"}";
        let err = parse_script(text).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_reports_bad_line() {
        let err = parse_script("{\"at_ms\": 0, \"op\": \"explode\"}").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_reach_backend_once() {
        let steps = (1..=5)
            .map(|i| technician_step(i * 10, &format!("t-{}", i)))
            .collect();
        let report = replay(EngineConfig::default(), steps, options(100, 0))
            .await
            .unwrap();

        assert_eq!(report.calls.len(), 1);
        assert_eq!(report.calls[0].query.technician, Selection::only("t-5"));
        assert_eq!(report.final_status, ApplyStatus::Applied);
        assert_eq!(
            report.transitions.last().map(|t| t.status),
            Some(ApplyStatus::Applied)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_slow_commit_supersedes_it() {
        let steps = vec![technician_step(0, "t-1"), technician_step(200, "t-2")];
        let report = replay(EngineConfig::default(), steps, options(300, 0))
            .await
            .unwrap();

        assert_eq!(report.calls.len(), 2);
        assert_eq!(report.final_status, ApplyStatus::Applied);
        assert_eq!(
            report.last_applied.unwrap().technician,
            Selection::only("t-2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_is_reported() {
        let report = replay(
            EngineConfig::default(),
            vec![technician_step(0, "t-1")],
            options(10, 1),
        )
        .await
        .unwrap();

        assert_eq!(report.final_status, ApplyStatus::Error);
        assert!(report
            .last_error
            .unwrap()
            .contains("simulated backend failure on call 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_mode_waits_for_apply_step() {
        let steps = vec![
            ScriptStep {
                at_ms: 0,
                command: FilterCommand::SetMode {
                    mode: ApplyMode::Manual,
                },
            },
            technician_step(10, "t-4"),
            ScriptStep {
                at_ms: 500,
                command: FilterCommand::Apply,
            },
        ];
        let report = replay(EngineConfig::default(), steps, options(20, 0))
            .await
            .unwrap();

        assert_eq!(report.calls.len(), 1);
        assert_eq!(report.calls[0].at_ms, 500);
        assert_eq!(report.apply_outcomes, vec!["applied".to_string()]);
        assert_eq!(report.final_status, ApplyStatus::Applied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_step_aborts_replay() {
        let steps = vec![ScriptStep {
            at_ms: 0,
            command: FilterCommand::UpdateFilter {
                key: "colour".to_string(),
                value: "red".to_string(),
            },
        }];
        let err = replay(EngineConfig::default(), steps, options(0, 0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Step 1 (update_filter)"));
    }
}
