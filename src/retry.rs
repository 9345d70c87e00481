//! Bounded per-task retries.
//!
//! Retries run inline on the worker that owns the task: a failed attempt is
//! never requeued, so the same repository is never cloned by two workers at
//! once and attempts stay strictly ordered.

use crate::cache::ResultCache;
use crate::task::{ProcessingOutcome, RepositoryTask};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Immutable view of the retry budget handed to each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Retries left after this attempt fails.
    pub attempts_remaining: u32,
}

impl AttemptContext {
    pub fn first(retries: u32) -> Self {
        Self {
            attempt: 1,
            attempts_remaining: retries,
        }
    }

    /// Context for the next attempt, or `None` once the budget is spent.
    pub fn next(self) -> Option<Self> {
        (self.attempts_remaining > 0).then(|| Self {
            attempt: self.attempt + 1,
            attempts_remaining: self.attempts_remaining - 1,
        })
    }
}

/// Wraps a unit of work with a decrementing retry budget and a fixed backoff.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    delay: Duration,
    cache: Option<Arc<ResultCache>>,
    cancel: CancellationToken,
}

impl RetryCoordinator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            cache: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Invalidate the task's cache entry before every retry.
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Stop retrying (and cut the backoff short) once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `body` until it yields a non-error outcome or the budget runs out.
    ///
    /// Terminates after at most `retries + 1` invocations. Errors marked as
    /// non-retryable end the loop immediately.
    pub async fn attempt<F, Fut>(
        &self,
        task: &RepositoryTask,
        retries: u32,
        mut body: F,
    ) -> ProcessingOutcome
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = ProcessingOutcome>,
    {
        let repo = task.full_name();
        let mut ctx = AttemptContext::first(retries);

        loop {
            let mut outcome = body(ctx).await;
            outcome.attempts = ctx.attempt;

            if !outcome.is_error() || !outcome.retryable {
                return outcome;
            }
            let Some(next) = ctx.next() else {
                tracing::warn!(
                    repo = %repo,
                    attempts = ctx.attempt,
                    error = outcome.error_detail.as_deref().unwrap_or("unknown"),
                    "Retry budget exhausted"
                );
                return outcome;
            };

            tracing::info!(
                repo = %repo,
                attempt = ctx.attempt,
                remaining = ctx.attempts_remaining,
                error = outcome.error_detail.as_deref().unwrap_or("unknown"),
                "Attempt failed, retrying"
            );

            if let Some(cache) = &self.cache {
                let name = repo.clone();
                if let Err(e) = cache.call(move |cache| cache.invalidate(&name)).await {
                    tracing::warn!(repo = %repo, error = %e, "Failed to invalidate cache entry");
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return outcome,
                _ = tokio::time::sleep(self.delay) => {}
            }
            ctx = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn task() -> RepositoryTask {
        RepositoryTask::new("acme", "widgets", "https://github.com/acme/widgets.git")
    }

    #[test]
    fn test_context_decrements_monotonically() {
        let mut ctx = AttemptContext::first(2);
        let mut seen = vec![ctx];
        while let Some(next) = ctx.next() {
            assert!(next.attempts_remaining < ctx.attempts_remaining);
            seen.push(next);
            ctx = next;
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.last().unwrap().attempt, 3);
    }

    #[tokio::test]
    async fn test_success_returns_after_first_attempt() {
        let coordinator = RetryCoordinator::new(Duration::ZERO);
        let calls = Mutex::new(0);
        let outcome = coordinator
            .attempt(&task(), 3, |_| {
                *calls.lock().unwrap() += 1;
                async { ProcessingOutcome::clean("acme/widgets", "abc") }
            })
            .await;
        assert!(!outcome.is_error());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_uses_whole_budget() {
        let coordinator = RetryCoordinator::new(Duration::ZERO);
        let contexts = Mutex::new(Vec::new());
        let outcome = coordinator
            .attempt(&task(), 2, |ctx| {
                contexts.lock().unwrap().push(ctx);
                async { ProcessingOutcome::error("acme/widgets", "linter crashed", true) }
            })
            .await;

        assert!(outcome.is_error());
        assert_eq!(outcome.attempts, 3);
        let remaining: Vec<u32> = contexts
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.attempts_remaining)
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_recovers_on_later_attempt() {
        let coordinator = RetryCoordinator::new(Duration::ZERO);
        let outcome = coordinator
            .attempt(&task(), 3, |ctx| async move {
                if ctx.attempt < 2 {
                    ProcessingOutcome::error("acme/widgets", "push rejected", true)
                } else {
                    ProcessingOutcome::clean("acme/widgets", "abc")
                }
            })
            .await;
        assert!(!outcome.is_error());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let coordinator = RetryCoordinator::new(Duration::ZERO);
        let calls = Mutex::new(0);
        let outcome = coordinator
            .attempt(&task(), 5, |_| {
                *calls.lock().unwrap() += 1;
                async { ProcessingOutcome::error("acme/widgets", "bad credentials", false) }
            })
            .await;
        assert!(outcome.is_error());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_invalidates_cache_entry() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(ResultCache::open(dir.path()));
        cache
            .put("acme/widgets", "abc", false, "clean", Duration::ZERO)
            .unwrap();

        let coordinator = RetryCoordinator::new(Duration::ZERO).with_cache(Arc::clone(&cache));
        coordinator
            .attempt(&task(), 1, |_| async {
                ProcessingOutcome::error("acme/widgets", "sync failed", true)
            })
            .await;

        assert!(cache.get("acme/widgets").is_none());
    }

    #[tokio::test]
    async fn test_cancellation_stops_backoff() {
        let token = CancellationToken::new();
        token.cancel();
        let coordinator =
            RetryCoordinator::new(Duration::from_secs(60)).with_cancellation(token);
        let outcome = coordinator
            .attempt(&task(), 5, |_| async {
                ProcessingOutcome::error("acme/widgets", "sync failed", true)
            })
            .await;
        assert_eq!(outcome.attempts, 1);
    }
}
