//! `arena` command-line entry point.
//!
//! ```bash
//! # Run the full pipeline over a directions file
//! arena run --directions directions.json --config arena.toml
//!
//! # Plan directions from a brief
//! ARENA_ORACLE_URL=http://localhost:8080/v1 arena plan --brief "energy in 2040" --count 4
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arena_pipeline::{plan_directions, run_pipeline, ArenaConfig, LlmOracle, OracleGate};
use clap::{Parser, Subcommand};
use coordination::Direction;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an arena TOML config (env overrides still apply)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the evaluation pipeline and print the result as JSON
    Run {
        /// JSON file holding an array of directions
        #[arg(long)]
        directions: PathBuf,

        /// Generation replicas per direction (overrides config)
        #[arg(long)]
        replicas: Option<u32>,

        /// Skip the final finalist debate
        #[arg(long, default_value_t = false)]
        no_debate: bool,
    },
    /// Plan directions from a brief and print them as JSON
    Plan {
        #[arg(long)]
        brief: String,

        #[arg(long, default_value_t = 4)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = ArenaConfig::load(args.config.as_deref())?;
    let oracle = Arc::new(LlmOracle::new(config.oracle.clone())?);
    info!(
        endpoint = %config.oracle.base_url,
        model = %config.oracle.model,
        "Arena starting"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    match args.command {
        Command::Run {
            directions,
            replicas,
            no_debate,
        } => {
            let text = std::fs::read_to_string(&directions)
                .with_context(|| format!("Failed to read directions {}", directions.display()))?;
            let directions: Vec<Direction> =
                serde_json::from_str(&text).context("Failed to parse directions JSON")?;
            if let Some(replicas) = replicas {
                config.pipeline.replica_count = replicas;
            }
            if no_debate {
                config.pipeline.use_debate = false;
            }

            let result = run_pipeline(oracle, directions, config.pipeline, cancel).await?;
            info!(
                champion = result.overall_champion.as_deref().unwrap_or("none"),
                failures = result.failures.len(),
                "Run complete"
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Plan { brief, count } => {
            let gate = OracleGate::from_config(oracle, &config.pipeline).with_cancellation(cancel);
            let report =
                plan_directions(&gate, &brief, count, config.pipeline.max_debate_rounds).await?;
            info!(source = ?report.source, directions = report.directions.len(), "Planning complete");
            println!("{}", serde_json::to_string_pretty(&report.directions)?);
        }
    }

    Ok(())
}
