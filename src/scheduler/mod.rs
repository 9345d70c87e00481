//! Bounded worker pool over a shared task queue.
//!
//! `min(worker_count, tasks)` workers pull repositories from one queue. Each
//! worker owns a task from pre-check to final outcome, retries included, and
//! sends exactly one outcome into the result channel. The aggregation loop
//! in [`Scheduler::run`] is the only place the [`RunSummary`] is mutated.

pub mod summary;

pub use summary::{Failure, RunSummary};

use crate::cache::ResultCache;
use crate::processor::RepositoryProcessor;
use crate::retry::RetryCoordinator;
use crate::task::{OutcomeStatus, ProcessingOutcome, RepositoryTask};
use crate::vcs::Vcs;
use futures::future::join_all;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Progress notifications for the terminal UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    TaskStarted { repo: String, worker: usize },
    CacheHit { repo: String },
    TaskFinished {
        repo: String,
        status: OutcomeStatus,
        from_cache: bool,
    },
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    /// Extra attempts after the first one fails.
    pub retries: u32,
    pub retry_delay: Duration,
    pub cache_max_age: chrono::Duration,
    /// Skip the cache pre-check and reprocess everything.
    pub force_refresh: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            retries: 2,
            retry_delay: crate::retry::DEFAULT_RETRY_DELAY,
            cache_max_age: chrono::Duration::hours(24),
            force_refresh: false,
        }
    }
}

pub struct Scheduler {
    processor: Arc<RepositoryProcessor>,
    vcs: Arc<dyn Vcs>,
    cache: Arc<ResultCache>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    event_tx: Option<mpsc::Sender<RunEvent>>,
}

/// State shared by every worker of one run.
struct WorkerShared {
    processor: Arc<RepositoryProcessor>,
    vcs: Arc<dyn Vcs>,
    cache: Arc<ResultCache>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    event_tx: Option<mpsc::Sender<RunEvent>>,
    retry: RetryCoordinator,
    queue: Mutex<VecDeque<RepositoryTask>>,
    /// Average processing time, used to estimate time saved by cache hits.
    average_hint: f64,
}

impl Scheduler {
    pub fn new(
        processor: Arc<RepositoryProcessor>,
        vcs: Arc<dyn Vcs>,
        cache: Arc<ResultCache>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            processor,
            vcs,
            cache,
            config,
            cancel: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Abort in-flight work and skip queued tasks once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every task and return one outcome per distinct repository.
    pub async fn run(&self, tasks: Vec<RepositoryTask>) -> RunSummary {
        let started = Instant::now();
        let tasks = dedupe(tasks);
        let total = tasks.len();
        let mut summary = RunSummary::new(total);

        if total == 0 {
            summary.finish(started.elapsed());
            return summary;
        }

        let workers = self.config.worker_count.clamp(1, total);
        tracing::info!(tasks = total, workers, "Starting run");

        let mut pending: HashSet<String> = tasks.iter().map(RepositoryTask::full_name).collect();
        let shared = Arc::new(WorkerShared {
            processor: self.processor.clone(),
            vcs: self.vcs.clone(),
            cache: self.cache.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            event_tx: self.event_tx.clone(),
            retry: RetryCoordinator::new(self.config.retry_delay)
                .with_cache(self.cache.clone())
                .with_cancellation(self.cancel.clone()),
            queue: Mutex::new(tasks.into_iter().collect()),
            average_hint: self.cache.average_duration(),
        });

        let (result_tx, mut result_rx) = mpsc::channel::<ProcessingOutcome>(total);
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let shared = shared.clone();
                let tx = result_tx.clone();
                tokio::spawn(async move { worker_loop(worker, shared, tx).await })
            })
            .collect();
        drop(result_tx);

        while let Some(outcome) = result_rx.recv().await {
            pending.remove(&outcome.repo);
            self.emit_event(RunEvent::TaskFinished {
                repo: outcome.repo.clone(),
                status: outcome.status,
                from_cache: outcome.from_cache,
            })
            .await;
            summary.add_outcome(outcome);
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker terminated abnormally");
            }
        }

        // A worker that died mid-task still owes an outcome.
        let mut lost: Vec<String> = pending.into_iter().collect();
        lost.sort();
        for repo in lost {
            summary.add_outcome(ProcessingOutcome::error(&repo, "worker terminated abnormally", false));
        }

        summary.finish(started.elapsed());
        tracing::info!(
            clean = summary.clean,
            issues_found = summary.issues_found,
            skipped = summary.skipped,
            errored = summary.errored,
            cache_hits = summary.cache_hits,
            duration_ms = summary.duration.as_millis() as u64,
            "Run complete"
        );
        summary
    }

    async fn emit_event(&self, event: RunEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}

/// Keep the first task per repository; names compare case-insensitively.
fn dedupe(tasks: Vec<RepositoryTask>) -> Vec<RepositoryTask> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|t| {
            let fresh = seen.insert(t.full_name().to_lowercase());
            if !fresh {
                tracing::debug!(repo = %t.full_name(), "Dropping duplicate task");
            }
            fresh
        })
        .collect()
}

async fn worker_loop(worker: usize, shared: Arc<WorkerShared>, tx: mpsc::Sender<ProcessingOutcome>) {
    loop {
        let next = shared
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let Some(task) = next else { break };

        let outcome = if shared.cancel.is_cancelled() {
            ProcessingOutcome::skipped(&task.full_name(), "run cancelled before start")
        } else {
            run_task(worker, &shared, &task).await
        };

        if tx.send(outcome).await.is_err() {
            break;
        }
    }
}

async fn run_task(worker: usize, shared: &WorkerShared, task: &RepositoryTask) -> ProcessingOutcome {
    let repo = task.full_name();
    emit(shared, RunEvent::TaskStarted {
        repo: repo.clone(),
        worker,
    })
    .await;

    if !shared.config.force_refresh
        && let Some(hit) = cache_precheck(shared, task).await
    {
        emit(shared, RunEvent::CacheHit { repo: repo.clone() }).await;
        return hit;
    }

    let processor = &*shared.processor;
    let cancel = &shared.cancel;
    let outcome = shared
        .retry
        .attempt(task, shared.config.retries, move |ctx| {
            processor.process(task, ctx, cancel)
        })
        .await;

    if outcome.is_terminal_success()
        && let Some(fingerprint) = outcome.fingerprint.clone()
    {
        let name = repo.clone();
        let summary = outcome.summary.clone();
        let (had_issues, duration) = (outcome.had_issues, outcome.duration);
        if let Err(e) = shared
            .cache
            .call(move |cache| cache.put(&name, &fingerprint, had_issues, &summary, duration))
            .await
        {
            tracing::warn!(repo = %repo, error = %e, "Failed to record result in cache");
        }
    }
    outcome
}

/// Serve a skip from the cache when the remote has not moved.
async fn cache_precheck(shared: &WorkerShared, task: &RepositoryTask) -> Option<ProcessingOutcome> {
    let repo = task.full_name();
    shared.cache.get(&repo)?;

    let fingerprint = match shared
        .vcs
        .remote_fingerprint(&task.clone_url, &shared.cancel)
        .await
    {
        Ok(fp) => fp,
        Err(e) => {
            tracing::debug!(repo = %repo, error = %e, "Remote fingerprint unavailable, processing");
            return None;
        }
    };

    if !shared.cache.is_fresh(
        &repo,
        &fingerprint,
        shared.config.cache_max_age,
        shared.average_hint,
    ) {
        tracing::debug!(repo = %repo, "Cache entry stale");
        return None;
    }

    let entry = shared.cache.get(&repo)?;
    tracing::info!(repo = %repo, "Unchanged since last run, skipping");
    Some(ProcessingOutcome::cached(
        &repo,
        &fingerprint,
        entry.had_issues,
        &entry.result_summary,
    ))
}

async fn emit(shared: &WorkerShared, event: RunEvent) {
    if let Some(ref tx) = shared.event_tx {
        tx.send(event).await.ok();
    }
}
