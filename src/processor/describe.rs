//! Markdown bodies for pull requests and issues.

use crate::linter::LintReport;
use crate::task::RepositoryTask;
use std::fmt::Write;
use std::path::PathBuf;

/// Hosting platforms reject bodies past 65536 characters.
pub const MAX_BODY_CHARS: usize = 60_000;

/// Listed individually before collapsing to a count.
const MAX_LISTED_FINDINGS: usize = 50;

/// What the artifact is asking the reader to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy<'a> {
    /// The branch carries the linter's own corrections.
    AutoFixed { changed: &'a [PathBuf] },
    /// Nothing could be corrected automatically.
    Manual,
}

/// Fill `{repo}`, `{owner}` and `{full_name}` in a title template.
pub fn render_title(template: &str, task: &RepositoryTask) -> String {
    template
        .replace("{full_name}", &task.full_name())
        .replace("{owner}", &task.owner)
        .replace("{repo}", &task.name)
}

/// One-line result summary stored in the cache and shown in the run report.
pub fn summarize(report: &LintReport) -> String {
    if report.is_clean() {
        return "no findings".to_string();
    }
    format!(
        "{} findings ({} auto-correctable, {} manual)",
        report.count(),
        report.correctable_count(),
        report.manual_count()
    )
}

pub fn describe(
    task: &RepositoryTask,
    fingerprint: &str,
    report: &LintReport,
    remedy: Remedy<'_>,
) -> String {
    let mut body = String::new();
    let short: String = fingerprint.chars().take(7).collect();

    let _ = writeln!(body, "## Style report for `{}`\n", task.full_name());
    match remedy {
        Remedy::AutoFixed { changed } => {
            let _ = writeln!(
                body,
                "Automatic corrections applied to {} file(s) on top of `{}`.",
                changed.len(),
                short
            );
        }
        Remedy::Manual => {
            let _ = writeln!(
                body,
                "The findings below on `{}` cannot be corrected automatically.",
                short
            );
        }
    }

    let _ = writeln!(body, "\n| | Count |\n|---|---|");
    let _ = writeln!(body, "| Files inspected | {} |", report.inspected_files);
    let _ = writeln!(body, "| Findings | {} |", report.count());
    let _ = writeln!(body, "| Auto-correctable | {} |", report.correctable_count());
    let _ = writeln!(body, "| Needs manual attention | {} |", report.manual_count());

    let files = report.file_summaries();
    if !files.is_empty() {
        let _ = writeln!(body, "\n### Files\n\n| File | Auto | Manual | Rules |\n|---|---|---|---|");
        for file in &files {
            let _ = writeln!(
                body,
                "| `{}` | {} | {} | {} |",
                file.path,
                file.correctable,
                file.manual,
                file.cops.join(", ")
            );
        }
    }

    let manual: Vec<_> = report.manual().collect();
    if !manual.is_empty() {
        let _ = writeln!(body, "\n### Manual fixes\n");
        for finding in manual.iter().take(MAX_LISTED_FINDINGS) {
            let location = match finding.line {
                Some(line) => format!("{}:{}", finding.path, line),
                None => finding.path.clone(),
            };
            let _ = writeln!(body, "- `{}` **{}** {}", location, finding.cop, finding.message);
        }
        if manual.len() > MAX_LISTED_FINDINGS {
            let _ = writeln!(body, "- ... and {} more", manual.len() - MAX_LISTED_FINDINGS);
        }
    }

    truncate_body(body)
}

fn truncate_body(mut body: String) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body;
    }
    let note = "\n\n_Report truncated._\n";
    let keep = MAX_BODY_CHARS - note.chars().count();
    let cut = body
        .char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    body.truncate(cut);
    body.push_str(note);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{finding, report};

    fn task() -> RepositoryTask {
        RepositoryTask::new("acme", "widgets", "https://github.com/acme/widgets.git")
    }

    #[test]
    fn test_render_title_fills_placeholders() {
        assert_eq!(render_title("Style fixes for {repo}", &task()), "Style fixes for widgets");
        assert_eq!(render_title("[{owner}] {full_name}", &task()), "[acme] acme/widgets");
        assert_eq!(render_title("no placeholders", &task()), "no placeholders");
    }

    #[test]
    fn test_summarize_counts() {
        let r = report(vec![
            finding("a.rb", "Style/StringLiterals", true),
            finding("a.rb", "Metrics/AbcSize", false),
        ]);
        assert_eq!(summarize(&r), "2 findings (1 auto-correctable, 1 manual)");
        assert_eq!(summarize(&LintReport::default()), "no findings");
    }

    #[test]
    fn test_describe_auto_fix_lists_files() {
        let r = report(vec![finding("app/user.rb", "Style/StringLiterals", true)]);
        let changed = vec![PathBuf::from("app/user.rb")];
        let body = describe(&task(), "abcdef123456", &r, Remedy::AutoFixed { changed: &changed });

        assert!(body.contains("acme/widgets"));
        assert!(body.contains("`abcdef1`"));
        assert!(body.contains("1 file(s)"));
        assert!(body.contains("| `app/user.rb` | 1 | 0 | Style/StringLiterals |"));
        assert!(!body.contains("### Manual fixes"));
    }

    #[test]
    fn test_describe_manual_lists_findings() {
        let r = report(vec![finding("lib/x.rb", "Metrics/MethodLength", false)]);
        let body = describe(&task(), "abc", &r, Remedy::Manual);
        assert!(body.contains("cannot be corrected automatically"));
        assert!(body.contains("- `lib/x.rb:1` **Metrics/MethodLength**"));
    }

    #[test]
    fn test_describe_caps_listed_findings() {
        let findings = (0..MAX_LISTED_FINDINGS + 5)
            .map(|i| finding(&format!("f{}.rb", i), "Metrics/AbcSize", false))
            .collect();
        let body = describe(&task(), "abc", &report(findings), Remedy::Manual);
        assert!(body.contains("... and 5 more"));
    }

    #[test]
    fn test_truncate_body_respects_limit() {
        let long = "é".repeat(MAX_BODY_CHARS + 100);
        let out = truncate_body(long);
        assert!(out.chars().count() <= MAX_BODY_CHARS);
        assert!(out.ends_with("_Report truncated._\n"));
    }
}
