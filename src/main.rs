use anyhow::Result;
use bookbind::error::Error;
use bookbind::{BundleOptions, DEFAULT_LONG_ENOUGH_MS, DEFAULT_MAX_PART_MS, bundle_books};
use clap::{Parser, ValueEnum};
use log::{error, info};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// directory tree containing the per-track audiobook files
    source: PathBuf,

    /// root of the output tree (<output>/<author>/<book>/<book>.m4a)
    #[arg(short, long, default_value = "target")]
    output: PathBuf,

    /// staging directory for symlinks and merge manifests, wiped per book
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// log verbosity
    #[arg(short, long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// maximum duration of one output part in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_PART_MS)]
    max_part_ms: u64,

    /// skip books whose representative track already exceeds this duration in milliseconds
    #[arg(long, default_value_t = DEFAULT_LONG_ENOUGH_MS)]
    long_enough_ms: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    _ = pretty_env_logger::formatted_builder()
        .filter_level(cli.log_level.into())
        .format_timestamp_secs()
        .parse_default_env()
        .try_init();

    // --- Configuration ---
    let defaults = BundleOptions::default();
    let options = BundleOptions {
        source_dir: cli.source,
        target_dir: cli.output,
        work_dir: cli.work_dir.unwrap_or(defaults.work_dir),
        long_enough_ms: cli.long_enough_ms,
        max_part_ms: cli.max_part_ms,
        chapter_prefix: defaults.chapter_prefix,
    };

    info!("Starting audiobook bundling with options:");
    info!("  Source Directory: {:?}", options.source_dir);
    info!("  Target Directory: {:?}", options.target_dir);
    info!("  Work Directory: {:?}", options.work_dir);
    info!("  Max Part Duration: {} ms", options.max_part_ms);
    info!("  Already-long Threshold: {} ms", options.long_enough_ms);
    info!("---");

    match bundle_books(&options) {
        Ok(()) => {
            info!("Bundling finished successfully!");
            Ok(())
        }
        Err(e @ Error::InvalidOptions(_)) => {
            // configuration problems get their own exit status
            error!("Bundling failed: {}", e);
            std::process::exit(2);
        }
        Err(e) => {
            error!("Bundling failed: {}", e);
            Err(e)?
        }
    }
}
