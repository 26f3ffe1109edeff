//! edgekeeper: one decision cycle per invocation.
//!
//! # Architecture Overview
//!
//! ```text
//!   edge list ─┐                 ┌──────────────┐
//!   canaries  ─┼─▶ orchestrator ─▶ edge probes  │──▶ edges (HTTP GET test object)
//!   records   ─┘   (workers)     └──────┬───────┘
//!                       │               │ latency | timeout | fail
//!                       ▼               ▼
//!                  ┌─────────┐    ┌──────────────┐
//!                  │ judges  │◀───│ edge records │ (<edge>.edgestore)
//!                  │main/can.│    └──────────────┘
//!                  └────┬────┘
//!                       ▼
//!                  ┌──────────┐   ┌───────────────┐
//!   run state ────▶│ selector │──▶│ zone manifests│
//!                  └────┬─────┘   └───────────────┘
//!                       ▼
//!                  run state (<dnet>.state.json)
//! ```
//!
//! Run from cron once per dnet; overlapping runs are refused by the lockfile.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use edgekeeper::config::load_config;
use edgekeeper::lifecycle::{run_cycle, CycleOptions};
use edgekeeper::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "edgekeeper")]
#[command(about = "Probe edges and choose the live set for a dnet", long_about = None)]
struct Cli {
    /// The dnet to run a cycle for.
    #[arg(short, long)]
    dnet: String,

    #[arg(short, long, default_value = "/etc/edgekeeper.toml")]
    config: PathBuf,

    /// Probe and decide without writing records, state or zones.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Rewrite every zone even if nothing changed.
    #[arg(short, long)]
    force_update: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("edgekeeper: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability, cli.verbose);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), dnet = %cli.dnet, "edgekeeper starting");

    let metrics_handle = match &config.observability.metrics_textfile {
        Some(_) => match metrics::init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install metrics recorder");
                None
            }
        },
        None => None,
    };

    let options = CycleOptions {
        dry_run: cli.dry_run,
        force_update: cli.force_update,
    };
    let result = run_cycle(&config, &cli.dnet, options).await;

    if let (Some(handle), Some(path)) = (&metrics_handle, &config.observability.metrics_textfile) {
        if let Err(e) = metrics::write_textfile(handle, path) {
            tracing::error!(path = %path.display(), error = %e, "Failed to write metrics textfile");
        }
    }

    match result {
        Ok(report) => {
            tracing::info!(
                run_id = %report.run_id,
                live = ?report.live,
                changed = report.changed,
                complete = report.complete,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Cycle aborted");
            ExitCode::FAILURE
        }
    }
}
