//! End-of-run report.

use crate::scheduler::RunSummary;
use crate::ui::icons::{CHECK, CLOCK, CROSS, SPARKLE};
use console::style;
use std::time::Duration;

/// Format a duration for display.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// Render the summary as printable lines.
pub fn render_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = Vec::new();
    let headline = if summary.all_success() {
        format!("{} Run complete", CHECK)
    } else {
        format!("{} Run complete with failures", CROSS)
    };
    lines.push(String::new());
    lines.push(style(headline).bold().to_string());
    lines.push(format!(
        "     {} repositories: {} clean, {} with issues, {} skipped ({} cached), {} failed",
        style(summary.total).bold(),
        style(summary.clean).green(),
        style(summary.issues_found).yellow(),
        summary.skipped,
        style(summary.cache_hits).dim(),
        style(summary.errored).red()
    ));
    lines.push(format!(
        "     {}Duration: {}",
        CLOCK,
        style(format_duration(summary.duration)).cyan()
    ));

    if !summary.artifacts.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}", style("Artifacts:").underlined()));
        for artifact in &summary.artifacts {
            lines.push(format!(
                "  {} {} {} #{} {}",
                SPARKLE,
                artifact.repo,
                style(artifact.kind).dim(),
                artifact.number,
                style(&artifact.url).cyan()
            ));
        }
    }

    if !summary.failures.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}", style("Failures:").underlined()));
        for failure in &summary.failures {
            let attempts = if failure.attempts == 1 {
                "1 attempt".to_string()
            } else {
                format!("{} attempts", failure.attempts)
            };
            lines.push(format!(
                "  {} {} ({}): {}",
                CROSS,
                style(&failure.repo).red().bold(),
                attempts,
                failure.detail
            ));
        }
    }

    lines.push(String::new());
    lines
}
