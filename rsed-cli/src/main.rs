use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use rsed::{Dispatcher, JobConfig, OutputSink, Parallelism, SedError, Settings};
use std::{ffi::OsString, num::NonZeroUsize, path::PathBuf, process::ExitCode};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod report;

/// Exit code for usage and configuration errors, matching clap's
const EXIT_USAGE: u8 = 2;

/// Single-dash long spellings accepted for compatibility
const SEQUENTIAL_ALIASES: [&str; 2] = ["-sequential", "-secventional"];

#[derive(Parser)]
#[command(name = "rsed", author, version, about, long_about = None)]
struct Cli {
    /// Ignore ASCII case when matching
    #[arg(short = 'i', long = "ignore-case")]
    ignore_case: bool,

    /// Rewrite files in place instead of printing the result
    #[arg(short = 's', long = "in-place")]
    in_place: bool,

    /// Process files one after another on a single thread
    #[arg(long)]
    sequential: bool,

    /// Number of worker threads (default: CPU cores)
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Start one thread per file instead of using a pool
    #[arg(long, conflicts_with = "threads")]
    thread_per_file: bool,

    /// Maximum line length in bytes, terminator included
    #[arg(long)]
    max_line_length: Option<usize>,

    /// What to do with longer lines (split|truncate|error)
    #[arg(long)]
    overflow: Option<String>,

    /// Text printed after each file's output; \n and \t are unescaped
    #[arg(long, allow_hyphen_values = true)]
    separator: Option<String>,

    /// Settings file (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Show a progress bar on stderr
    #[arg(long)]
    progress: bool,

    /// Print the batch result as JSON on stderr
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,

    /// Literal text to search for
    #[arg(allow_hyphen_values = true)]
    pattern: String,

    /// Text to replace every occurrence with
    #[arg(allow_hyphen_values = true)]
    replacement: String,

    /// Files to process
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            debug!("Run aborted: {:?}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            if e.downcast_ref::<SedError>().is_some_and(SedError::is_usage_error) {
                eprintln!("\n{}", Cli::command().render_usage());
            }
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let settings =
        Settings::load_from(cli.config.as_deref()).context("Failed to load settings")?;
    init_logging(cli.log_level.as_deref().unwrap_or(&settings.log_level));

    let config = build_job(&cli, settings)?;
    debug!(
        "Effective job: {:?} ({} file(s), sequential: {}, line limit: {:?})",
        config.parallelism,
        config.files.len(),
        config.sequential,
        config.line_limit
    );
    let in_place = config.in_place;
    let sink = if in_place {
        OutputSink::null()
    } else {
        OutputSink::stdout()
    };

    let mut dispatcher = Dispatcher::new(config, sink)?;
    if cli.progress {
        dispatcher = dispatcher.with_progress(report::progress_bar());
    }

    let result = dispatcher.run()?;
    if cli.json {
        report::print_json(&result)?;
    } else {
        report::print_summary(&result, in_place);
    }
    Ok(result.exit_code())
}

/// Rewrites single-dash long flags into the form clap understands
fn normalize_args<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
    let mut seen_terminator = false;
    args.into_iter()
        .map(|arg| {
            if arg == "--" {
                seen_terminator = true;
            }
            if !seen_terminator && SEQUENTIAL_ALIASES.iter().any(|alias| arg == *alias) {
                OsString::from("--sequential")
            } else {
                arg
            }
        })
        .collect()
}

/// Settings file values first, then command-line flags on top
fn build_job(cli: &Cli, settings: Settings) -> anyhow::Result<JobConfig> {
    let mut config = settings.into_job(&cli.pattern, &cli.replacement, cli.files.clone());
    config.case_insensitive = cli.ignore_case;
    config.in_place = cli.in_place;
    config.sequential = cli.sequential;

    if cli.thread_per_file {
        config.parallelism = Parallelism::PerFile;
    } else if let Some(threads) = cli.threads {
        config.parallelism = Parallelism::Pool(threads);
    }
    if let Some(max_len) = cli.max_line_length {
        config.line_limit.max_len = Some(max_len);
    }
    if let Some(policy) = &cli.overflow {
        config.line_limit.overflow = policy.parse()?;
    }
    if let Some(separator) = &cli.separator {
        config.block_separator = unescape(separator);
    }
    Ok(config)
}

fn unescape(s: &str) -> String {
    s.replace("\\n", "\n").replace("\\t", "\t")
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        eprintln!("Could not initialise logging: {}", e);
    }
}
