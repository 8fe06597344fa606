use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rsed::{BatchResult, FileStatus};

pub fn progress_bar() -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    ProgressBar::new(0).with_style(style)
}

/// Human-readable report on stderr; stdout carries only streamed output
pub fn print_summary(result: &BatchResult, in_place: bool) {
    for outcome in &result.outcomes {
        match outcome.status {
            FileStatus::Completed if in_place => {
                eprintln!(
                    "Result is in file with name '{}' ({} replacement(s)).",
                    outcome.path.display().to_string().blue(),
                    outcome.stats.replacements
                );
            }
            FileStatus::Completed => {}
            FileStatus::Degraded => {
                eprintln!(
                    "{} {}: {}",
                    "warning:".yellow().bold(),
                    outcome.path.display(),
                    outcome.message.as_deref().unwrap_or_default()
                );
            }
            FileStatus::Failed => {
                eprintln!(
                    "{} {}",
                    "failed:".red().bold(),
                    outcome.message.as_deref().unwrap_or_default()
                );
            }
        }
    }

    if in_place || result.has_failures() {
        eprintln!(
            "\n{} replacement(s) in {} of {} file(s)",
            result.total_replacements().to_string().green(),
            result.completed_count(),
            result.outcomes.len()
        );
    }
}

pub fn print_json(result: &BatchResult) -> anyhow::Result<()> {
    eprintln!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
