//! FieldOps filter engine CLI
//!
//! Standalone tools around the dashboard filter engine:
//! - `presets` / `regions`: inspect the static tables
//! - `query`: resolve one selection into the query the data layer receives
//! - `replay`: run a scripted edit session against a simulated backend

use anyhow::Result;
use clap::{Parser, Subcommand};
use fieldops_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod cli;

use cli::config::FieldOpsConfig;

#[derive(Parser, Debug)]
#[command(name = "fieldops", version, about = "FieldOps filter engine tools")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file with a [filters] table (default: $FIELDOPS_HOME/config.toml)
    #[arg(long, global = true, env = "FIELDOPS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve every date preset
    Presets {
        /// Resolve against this local time instead of now (e.g. 2024-04-01T08:00)
        #[arg(long)]
        now: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List regions and their municipalities
    Regions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a filter selection into the effective query
    Query {
        /// Date preset: 24h, 7d, 30d, quarter or custom
        #[arg(short, long)]
        preset: Option<String>,

        /// Custom range start (implies --preset custom)
        #[arg(long)]
        from: Option<String>,

        /// Custom range end (implies --preset custom)
        #[arg(long)]
        to: Option<String>,

        /// Technician id, or "all"
        #[arg(short, long)]
        technician: Option<String>,

        /// Municipality to include (repeatable)
        #[arg(short, long = "municipality")]
        municipalities: Vec<String>,

        /// Region key to include (repeatable)
        #[arg(short, long = "region")]
        regions: Vec<String>,

        /// Action, or "all"
        #[arg(short, long)]
        action: Option<String>,

        /// Resolve against this local time instead of now
        #[arg(long)]
        now: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a JSON-lines edit script against a simulated backend
    Replay {
        /// Script path
        script: PathBuf,

        /// Simulated backend latency per call
        #[arg(long, default_value_t = 200)]
        latency_ms: u64,

        /// Fail every Nth backend call
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        fail_every: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = fieldops_logging::init_logging(LogConfig {
        app_name: "fieldops",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: logging disabled: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    debug!(command = ?cli.command, "running command");
    match cli.command {
        Commands::Presets { now, json } => cli::presets::run(cli::presets::PresetsArgs { now, json }),
        Commands::Regions { json } => cli::regions::run(cli::regions::RegionsArgs { json }),
        Commands::Query {
            preset,
            from,
            to,
            technician,
            municipalities,
            regions,
            action,
            now,
            json,
        } => {
            let config = FieldOpsConfig::load(cli.config.as_deref())?;
            let args = cli::query::QueryArgs {
                preset,
                from,
                to,
                technician,
                municipalities,
                regions,
                action,
                now,
                json,
            };
            cli::runtime()?.block_on(cli::query::run(config.filters, args))
        }
        Commands::Replay {
            script,
            latency_ms,
            fail_every,
            json,
        } => {
            let config = FieldOpsConfig::load(cli.config.as_deref())?;
            let args = cli::replay::ReplayArgs {
                script,
                latency_ms,
                fail_every,
                json,
            };
            cli::runtime()?.block_on(cli::replay::run(config.filters, args))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query_flags() {
        let cli = Cli::try_parse_from([
            "fieldops",
            "query",
            "--preset",
            "quarter",
            "-m",
            "Niš",
            "-m",
            "Bor",
            "--region",
            "Beograd",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Query {
                preset,
                municipalities,
                regions,
                json,
                ..
            } => {
                assert_eq!(preset.as_deref(), Some("quarter"));
                assert_eq!(municipalities, vec!["Niš".to_string(), "Bor".to_string()]);
                assert_eq!(regions, vec!["Beograd".to_string()]);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_replay_defaults() {
        let cli = Cli::try_parse_from(["fieldops", "-v", "replay", "session.jsonl"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Replay {
                script,
                latency_ms,
                fail_every,
                json,
            } => {
                assert_eq!(script, PathBuf::from("session.jsonl"));
                assert_eq!(latency_ms, 200);
                assert_eq!(fail_every, None);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_fail_every_rejects_zero() {
        assert!(Cli::try_parse_from(["fieldops", "replay", "s.jsonl", "--fail-every", "0"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["fieldops", "regions", "--config", "/tmp/fo.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/fo.toml")));
    }
}
