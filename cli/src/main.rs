//! nightwatch — unattended multi-target observation runner
//!
//! Reads a night plan, validates it, and either previews the timeline or
//! drives the targets against the configured ACP server (or a simulated
//! controller in dry-run mode). Ctrl-C trips the run-wide cancellation
//! flag; in-flight waits resolve within one poll interval.

mod config;
mod controller;
mod report;

use anyhow::Context;
use clap::Parser;
use config::FileConfig;
use controller::{AcpController, PlanDefaults};
use nightwatch_acp::{AcpClient, Credentials, TimeoutConfig};
use nightwatch_scheduler::{
    ObservationQueue, Orchestrator, RunContext, SharedControllerOps, SimulatedController,
    StatusEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nightwatch", about = "Unattended multi-target observation runner")]
struct Cli {
    /// Night plan configuration file (YAML).
    #[arg(short, long)]
    config: PathBuf,

    /// Simulate the run: fast-forwarded time, no controller traffic.
    #[arg(long)]
    dry_run: bool,

    /// Validate the plan and print the timeline without executing it.
    #[arg(long)]
    validate_only: bool,

    /// Print aggregate plan statistics and exit.
    #[arg(long)]
    summary: bool,

    /// Emit the final run report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let file = FileConfig::load(&cli.config)?;
    let (mut schedule, targets) = match file.into_schedule() {
        Ok(parts) => parts,
        Err(err) => {
            tracing::error!("{err}");
            anyhow::bail!("configuration is invalid");
        }
    };
    if cli.dry_run {
        schedule.dryrun = true;
    }

    let queue = match ObservationQueue::build(&targets, &schedule) {
        Ok(queue) => queue,
        Err(err) => {
            tracing::error!("{err}");
            anyhow::bail!("target list is invalid");
        }
    };
    tracing::info!(
        targets = queue.len(),
        dryrun = schedule.dryrun,
        "plan loaded from {}",
        cli.config.display()
    );

    if cli.summary {
        print!("{}", report::render_summary(&Orchestrator::summary(&queue)));
        return Ok(());
    }

    let ctx = Arc::new(RunContext::for_config(schedule.clone()));

    let controller: SharedControllerOps = if schedule.dryrun || cli.validate_only {
        Arc::new(SimulatedController::new(ctx.clock.clone()))
    } else {
        let client = AcpClient::new(
            file.acp_server.url.clone(),
            Credentials {
                username: file.acp_server.username.clone(),
                password: file.acp_server.password.clone(),
            },
            TimeoutConfig::default(),
        )
        .context("cannot build ACP client")?;
        Arc::new(AcpController::new(
            client,
            file.acp_server.filters.clone(),
            PlanDefaults {
                dither: file.global_settings.dither,
                auto_focus: file.global_settings.auto_focus,
                af_interval: file.global_settings.af_interval,
            },
        ))
    };

    let orchestrator = Orchestrator::new(ctx.clone(), controller);

    if cli.validate_only {
        print!("{}", report::render_timeline(&orchestrator.validate_only(&queue)));
        return Ok(());
    }

    orchestrator.observers().add(|event: &StatusEvent| {
        match &event.detail {
            Some(detail) => tracing::info!(
                "{}: {} -> {} ({detail})",
                event.target_name,
                event.old_state,
                event.new_state
            ),
            None => tracing::info!(
                "{}: {} -> {}",
                event.target_name,
                event.old_state,
                event.new_state
            ),
        }
    });

    // Operator stop: first Ctrl-C cancels the run cooperatively.
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("stop requested, cancelling run");
                ctx.cancel();
            }
        });
    }

    let run_report = orchestrator
        .run(queue)
        .await
        .map_err(|err| anyhow::anyhow!("cannot reach the controller: {err}"))?;

    if cli.json {
        println!("{}", run_report.to_json()?);
    } else {
        print!("{}", report::render_report(&run_report));
    }

    if !run_report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
