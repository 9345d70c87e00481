use crate::scheduler::RunEvent;
use crate::task::OutcomeStatus;
use crate::ui::icons::{CACHED, CHECK, CROSS, SKIP, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Live terminal view of a run, driven by [`RunEvent`]s.
///
/// A header bar counts finished repositories; each in-flight repository gets
/// its own spinner, removed again when the task finishes. A finished task
/// leaves one status line above the bars.
pub struct RunProgress {
    multi: MultiProgress,
    header: ProgressBar,
    active: Mutex<HashMap<String, ProgressBar>>,
    verbose: bool,
}

impl RunProgress {
    pub fn new(total: usize, verbose: bool) -> Self {
        Self::with_target(total, verbose, ProgressDrawTarget::stderr())
    }

    /// A progress view that draws nothing.
    pub fn hidden(total: usize) -> Self {
        Self::with_target(total, false, ProgressDrawTarget::hidden())
    }

    fn with_target(total: usize, verbose: bool, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let header_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let header = multi.add(ProgressBar::new(total as u64));
        header.set_style(header_style);
        header.set_prefix("Repos");

        Self {
            multi,
            header,
            active: Mutex::new(HashMap::new()),
            verbose,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn handle_event(&self, event: &RunEvent) {
        match event {
            RunEvent::TaskStarted { repo, worker } => self.on_started(repo, *worker),
            RunEvent::CacheHit { repo } => {
                if self.verbose {
                    self.print_line(format!(
                        "  {} {} unchanged since last run",
                        CACHED,
                        style(repo).dim()
                    ));
                }
            }
            RunEvent::TaskFinished {
                repo,
                status,
                from_cache,
            } => self.on_finished(repo, *status, *from_cache),
        }
    }

    fn on_started(&self, repo: &str, worker: usize) {
        let spinner_style = ProgressStyle::default_spinner()
            .template("  {prefix:.bold} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix(format!("[w{}]", worker));
        bar.set_message(repo.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        self.active().insert(repo.to_string(), bar);
        self.header.set_message(style(repo).yellow().to_string());
    }

    fn on_finished(&self, repo: &str, status: OutcomeStatus, from_cache: bool) {
        if let Some(bar) = self.active().remove(repo) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        self.header.inc(1);

        let line = match status {
            OutcomeStatus::Clean => format!("  {} {} clean", CHECK, style(repo).green()),
            OutcomeStatus::IssuesFound => format!(
                "  {} {} {}",
                WARN,
                style(repo).yellow().bold(),
                style("issues found").yellow()
            ),
            OutcomeStatus::Skipped if from_cache => {
                format!("  {} {} {}", CACHED, repo, style("cached").dim())
            }
            OutcomeStatus::Skipped => format!("  {} {} {}", SKIP, repo, style("skipped").dim()),
            OutcomeStatus::Error => {
                format!("  {} {} {}", CROSS, style(repo).red().bold(), style("failed").red())
            }
        };
        self.print_line(line);
    }

    /// Stop every bar; call once the event channel is closed.
    pub fn finish(&self) {
        for (_, bar) in self.active().drain() {
            bar.finish_and_clear();
        }
        self.header.finish_with_message("done");
    }

    pub fn finished_count(&self) -> u64 {
        self.header.position()
    }

    pub fn in_flight(&self) -> usize {
        self.active().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_in_flight_repositories() {
        let ui = RunProgress::hidden(2);
        ui.handle_event(&RunEvent::TaskStarted {
            repo: "acme/a".into(),
            worker: 0,
        });
        ui.handle_event(&RunEvent::TaskStarted {
            repo: "acme/b".into(),
            worker: 1,
        });
        assert_eq!(ui.in_flight(), 2);

        ui.handle_event(&RunEvent::TaskFinished {
            repo: "acme/a".into(),
            status: OutcomeStatus::Clean,
            from_cache: false,
        });
        assert_eq!(ui.in_flight(), 1);
        assert_eq!(ui.finished_count(), 1);
    }

    #[test]
    fn test_cache_hits_count_as_finished() {
        let ui = RunProgress::hidden(1);
        ui.handle_event(&RunEvent::CacheHit {
            repo: "acme/a".into(),
        });
        ui.handle_event(&RunEvent::TaskFinished {
            repo: "acme/a".into(),
            status: OutcomeStatus::Skipped,
            from_cache: true,
        });
        assert_eq!(ui.finished_count(), 1);
        assert_eq!(ui.in_flight(), 0);
    }

    #[test]
    fn test_finish_clears_leftover_bars() {
        let ui = RunProgress::hidden(1);
        ui.handle_event(&RunEvent::TaskStarted {
            repo: "acme/a".into(),
            worker: 0,
        });
        ui.finish();
        assert_eq!(ui.in_flight(), 0);
    }
}
