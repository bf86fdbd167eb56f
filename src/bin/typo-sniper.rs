//! Typo Sniper command-line interface.
//!
//! Merges the configuration layers (YAML file, environment, flags),
//! runs the scan, writes the requested reports and prints a summary.
//! Exit codes: 0 success, 1 fatal configuration or I/O error, 2 when
//! some seed produced zero records due to repeated transient errors.

use std::path::PathBuf;

use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use typo_sniper::export::{self, ReportFormat};
use typo_sniper::scan::config::Config;
use typo_sniper::scan::errors::FatalError;
use typo_sniper::scan::scanner::{self, Scanner};

/// Detect typosquats of monitored brand domains
#[derive(Parser)]
#[command(name = "typo-sniper")]
#[command(version)]
#[command(about = "Detect typosquats of monitored brand domains", long_about = None)]
struct Cli {
    /// Input file with one seed domain per line ('#' comments allowed)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Output directory for reports
    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = "reports")]
    output: PathBuf,

    /// Report formats to write (repeatable)
    #[arg(long = "format", value_enum, value_name = "FORMAT")]
    format: Vec<ReportFormat>,

    /// Keep only domains registered within the last N months
    #[arg(long = "months", value_name = "N")]
    months: Option<u32>,

    /// YAML configuration file
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Worker pool size
    #[arg(long = "max-workers", value_name = "N")]
    max_workers: Option<usize>,

    /// Cache entry lifetime in seconds
    #[arg(long = "cache-ttl", value_name = "SECONDS")]
    cache_ttl: Option<u64>,

    /// Disable the on-disk cache
    #[arg(long = "no-cache")]
    no_cache: bool,

    /// Enable the ML scorer
    #[arg(long = "ml")]
    ml: bool,

    /// Path to an ML model weight file
    #[arg(long = "ml-model", value_name = "PATH")]
    ml_model: Option<PathBuf>,

    /// Active-learning review budget (implies active learning)
    #[arg(long = "ml-review", value_name = "N")]
    ml_review: Option<usize>,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Debug logging
    #[arg(long = "debug")]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    if let Err(err) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("failed to initialize logging: {}", err);
    }

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return 1;
        }
    };

    let seeds = match scanner::load_seeds(&cli.input) {
        Ok(seeds) => seeds,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return 1;
        }
    };
    log::info!("loaded {} seed(s) from {}", seeds.len(), cli.input.display());

    let scanner = match Scanner::build(config).await {
        Ok(scanner) => scanner,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return 1;
        }
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("scanning {} seed(s)", seeds.len()));
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let outcome = scanner.scan(&seeds).await;
    spinner.finish_and_clear();

    let formats = if cli.format.is_empty() {
        vec![ReportFormat::Json]
    } else {
        cli.format.clone()
    };
    let written = match export::write_reports(
        &cli.output,
        &formats,
        &outcome.records,
        &outcome.meta,
        &outcome.review,
    ) {
        Ok(written) => written,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return 1;
        }
    };

    print_summary(&outcome, &written);

    if outcome.seeds_failed.is_empty() {
        0
    } else {
        2
    }
}

/// Merge the configuration layers; the command line wins.
fn build_config(cli: &Cli) -> Result<Config, FatalError> {
    let mut config = match &cli.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;

    if let Some(months) = cli.months {
        config.months_filter = months;
    }
    if let Some(max_workers) = cli.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(cache_ttl) = cli.cache_ttl {
        config.cache_ttl = cache_ttl;
    }
    if cli.no_cache {
        config.use_cache = false;
    }
    if cli.ml {
        config.enable_ml = true;
    }
    if let Some(path) = &cli.ml_model {
        config.ml_model_path = Some(path.clone());
        config.enable_ml = true;
    }
    if let Some(budget) = cli.ml_review {
        config.ml_review_budget = budget;
        config.ml_enable_active_learning = true;
        config.enable_ml = true;
    }

    config.validate()?;
    Ok(config)
}

fn print_summary(outcome: &scanner::ScanOutcome, written: &[PathBuf]) {
    let elapsed = outcome.meta.finished_at - outcome.meta.started_at;
    println!();
    println!("{}", "scan complete".green().bold());
    println!(
        "  seeds attempted:   {}",
        outcome.seeds_attempted.to_string().bold()
    );
    println!(
        "  records emitted:   {}",
        outcome.records.len().to_string().bold()
    );
    if !outcome.review.is_empty() {
        println!("  queued for review: {}", outcome.review.len());
    }
    if !outcome.degraded.is_empty() {
        println!(
            "  degraded:          {}",
            outcome.degraded.join(", ").yellow()
        );
    }
    if !outcome.seeds_failed.is_empty() {
        println!(
            "  {} {}",
            "seeds with no results due to errors:".red(),
            outcome.seeds_failed.join(", ")
        );
    }
    if let Some(stats) = &outcome.cache_stats {
        println!(
            "  cache:             {} hit(s), {} miss(es), {} write(s)",
            stats.hits, stats.misses, stats.writes
        );
    }
    println!("  elapsed:           {}s", elapsed.num_seconds());
    for path in written {
        println!("  wrote {}", path.display().to_string().cyan());
    }
}
