//! Organization sweep (`stylesweep run`).

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use stylesweep::cache::ResultCache;
use stylesweep::config::{CliOverrides, SweepConfig};
use stylesweep::discovery::{Discovery, RepoSelection, clone_host_for};
use stylesweep::hosting::{GitHubClient, HostingApi};
use stylesweep::linter::{Linter, RubocopLinter};
use stylesweep::process::CommandRunner;
use stylesweep::processor::RepositoryProcessor;
use stylesweep::reconcile::ArtifactReconciler;
use stylesweep::scheduler::{RunEvent, Scheduler};
use stylesweep::task::RepositoryTask;
use stylesweep::ui::{RunProgress, render_summary};
use stylesweep::vcs::{GitCli, Vcs};

use super::super::Cli;
use super::load_config;

/// Buffered progress events; workers wait when the UI falls this far behind.
const EVENT_BUFFER: usize = 256;

pub async fn cmd_run(cli: &Cli, overrides: CliOverrides, dry_run: bool, json: bool) -> Result<()> {
    let config = load_config(cli)?.with_cli_args(overrides);
    config.ensure_runnable()?;

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id);
    execute(cli, config, dry_run, json).instrument(span).await
}

async fn execute(cli: &Cli, config: SweepConfig, dry_run: bool, json: bool) -> Result<()> {
    let owner = config.owner()?.to_string();
    let token = config.token()?.to_string();
    let api_url = config.toml.github.api_url.clone();

    let api: Arc<dyn HostingApi> = Arc::new(
        GitHubClient::new(token.clone(), api_url.clone())
            .context("Failed to build hosting client")?,
    );
    let selection = RepoSelection::new(&config.toml.repos)?;
    let discovery = Discovery::new(api.clone(), clone_host_for(&api_url));
    let tasks = discovery
        .discover(&owner, &config.toml.github.topics, &selection)
        .await
        .with_context(|| format!("Failed to discover repositories for {}", owner))?;

    if dry_run {
        print_plan(&owner, &tasks);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No repositories matched for {}.", owner);
        return Ok(());
    }

    let runner = CommandRunner::new(Duration::from_secs(config.toml.run.task_timeout_secs));
    let vcs: Arc<dyn Vcs> = Arc::new(GitCli::new(runner.clone(), Some(token)));
    let linter: Arc<dyn Linter> = Arc::new(RubocopLinter::new(
        runner,
        config.toml.linter.command.clone(),
        config.toml.linter.args.clone(),
    ));
    let cache = Arc::new(ResultCache::open(config.cache_dir()));
    let processor = Arc::new(RepositoryProcessor::new(
        vcs.clone(),
        linter,
        ArtifactReconciler::new(api),
        config.processor_settings(),
    ));

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            signal_token.cancel();
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel::<RunEvent>(EVENT_BUFFER);
    let progress = if json {
        RunProgress::hidden(tasks.len())
    } else {
        RunProgress::new(tasks.len(), cli.verbose)
    };
    let ui_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            progress.handle_event(&event);
        }
        progress.finish();
    });

    let scheduler = Scheduler::new(processor, vcs, cache, config.scheduler_config())
        .with_event_channel(event_tx)
        .with_cancellation(cancel.clone());
    let summary = scheduler.run(tasks).await;
    drop(scheduler);
    if let Err(e) = ui_task.await {
        tracing::warn!(error = %e, "Progress display terminated abnormally");
    }

    if json {
        let out = serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?;
        println!("{}", out);
    } else {
        for line in render_summary(&summary) {
            println!("{}", line);
        }
    }
    if cancel.is_cancelled() {
        eprintln!("Run was interrupted; unfinished repositories were skipped.");
    }

    // Per-repository failures are reported above and do not fail the process.
    Ok(())
}

fn print_plan(owner: &str, tasks: &[RepositoryTask]) {
    println!();
    println!("Dry run for {}: {} repositories would be processed", owner, tasks.len());
    println!();
    for task in tasks {
        println!("  {}", task.full_name());
    }
    println!();
}
