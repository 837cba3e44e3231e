//! Member Sales Dashboard
//!
//! Compares headcount, transaction count and revenue between two fiscal years,
//! broken down by member category and new/existing customer status.

mod aggregate;
mod cache;
mod config;
mod constants;
mod dataset;
mod error;
mod filter;
mod fiscal;
mod records;
mod reports;
mod schema;
mod source;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use aggregate::ComparisonYears;
use cache::Cache;
use config::{Config, FileConfig};
use filter::{CategoryFilter, FilterSelection, StatusFilter};
use records::Locale;

/// Load config file or exit with helpful message
fn load_config_file(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        anyhow::bail!(
            "Config file '{}' not found.\n\n\
            To get started:\n\
            1. Copy member-sales.toml.example to {}\n\
            2. Point [source] at your spreadsheet\n\n\
            See member-sales.toml.example for the required format.",
            path.display(),
            constants::CONFIG_FILENAME
        );
    }

    FileConfig::load(path)
}

#[derive(Parser, Debug)]
#[command(name = "member-sales")]
#[command(about = "Fiscal-year sales comparison by member category and customer status")]
struct Args {
    /// Config file
    #[arg(short, long, default_value = constants::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Data directory for the dataset cache
    #[arg(short, long, default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Output directory for generated CSV/JSON reports
    #[arg(short, long, default_value = "./output", global = true)]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,

    /// Member category: all, general, offset, thesis (Korean labels accepted)
    #[arg(short, long, value_parser = parse_category)]
    member: Option<CategoryFilter>,

    /// Customer status: both, new, existing (ignored when member is "all")
    #[arg(short, long, value_parser = parse_status)]
    status: Option<StatusFilter>,

    /// Override the configured source (URL or local path)
    #[arg(long, global = true)]
    source: Option<String>,

    /// Label language for reports
    #[arg(long, value_enum, global = true)]
    locale: Option<Locale>,

    /// Re-download the spreadsheet even if a cached copy exists
    #[arg(long, global = true)]
    refresh: bool,

    /// Print the dashboard as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute totals for every member/status combination
    Sweep,

    /// Manage the cached dataset
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Show cached sources
    Stats,

    /// Remove the cached copy of the configured source
    Clear,
}

fn parse_category(s: &str) -> Result<CategoryFilter, String> {
    s.parse()
}

fn parse_status(s: &str) -> Result<StatusFilter, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(args.verbose)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Open cache database (in data directory)
    std::fs::create_dir_all(&args.data_dir)?;
    let cache = Cache::open(&args.data_dir.join(constants::CACHE_FILENAME)).await?;

    match &args.command {
        Some(Command::Cache { action }) => handle_cache_command(action, &args, &cache).await,
        Some(Command::Sweep) => run_sweep(&args, &cache, &resolve_config(&args)?).await,
        None => run_report(&args, &cache, &resolve_config(&args)?).await,
    }
}

/// WARN everywhere by default; `--verbose` raises only this crate to DEBUG
fn log_filter(verbose: bool) -> Result<EnvFilter> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    if verbose {
        Ok(filter.add_directive("member_sales=debug".parse()?))
    } else {
        Ok(filter)
    }
}

/// Progress lines go to stderr when stdout carries a JSON document
fn progress_writer(args: &Args) -> Box<dyn Write> {
    if args.json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    }
}

/// Load the config file and apply command-line overrides
fn resolve_config(args: &Args) -> Result<Config> {
    let file_config = load_config_file(&args.config)?;
    let mut config = Config::from_file(&file_config, args.source.clone())?;
    if let Some(locale) = args.locale {
        config.locale = locale;
    }
    Ok(config)
}

/// Handle cache subcommands
async fn handle_cache_command(action: &CacheCommand, args: &Args, cache: &Cache) -> Result<()> {
    match action {
        CacheCommand::Stats => {
            let stats = cache.stats().await?;
            if stats.sources.is_empty() {
                println!("No dataset cached.");
                return Ok(());
            }

            println!("{:<8} {:<26} Source", "Records", "Loaded");
            println!("{}", "-".repeat(70));
            for source in &stats.sources {
                println!(
                    "{:<8} {:<26} {}",
                    source.records, source.loaded_at, source.source_key
                );
            }
            println!("{}", "-".repeat(70));
            println!("{}", stats);
            Ok(())
        }

        CacheCommand::Clear => {
            let config = resolve_config(args)?;
            let key = dataset::cache_key(&config);
            if cache.clear(&key).await? {
                println!("Cleared cached dataset for {}", config.location);
            } else {
                println!("No cached dataset for {}", config.location);
            }
            Ok(())
        }
    }
}

/// Load the dataset and report where it came from
async fn load_dataset(
    args: &Args,
    cache: &Cache,
    config: &Config,
    log: &mut impl Write,
) -> Result<(dataset::Dataset, ComparisonYears)> {
    writeln!(log, "Member Sales Dashboard")?;
    writeln!(log, "=============================================\n")?;
    writeln!(log, "Source: {}", config.location)?;
    writeln!(log, "Layout: {}", config.normalize.convention)?;

    let dataset = dataset::load(cache, config, args.refresh).await?;
    tracing::debug!(key = %dataset.source_key, "dataset ready");
    writeln!(
        log,
        "Loaded {} records from {} ({})\n",
        dataset.len(),
        dataset.origin,
        dataset.loaded_at.format("%Y-%m-%d %H:%M UTC")
    )?;

    if dataset.is_empty() {
        eprintln!("  Warning: the source produced no records; every total will be zero");
    }

    let years = dataset.comparison_years(config);
    if !config.years_configured {
        writeln!(log, "Comparing {} and {} (latest years in the data)\n", years.previous, years.current)?;
    }

    let present = dataset.years();
    for year in years.as_array() {
        if !present.contains(&year) {
            eprintln!("  Warning: no records for fiscal year {} (present: {:?})", year, present);
        }
    }

    Ok((dataset, years))
}

/// Main flow: one selection, printed and written to the output directory
async fn run_report(args: &Args, cache: &Cache, config: &Config) -> Result<()> {
    let mut log = progress_writer(args);
    let (dataset, years) = load_dataset(args, cache, config, &mut log).await?;

    let selection = FilterSelection::new(
        args.member.unwrap_or(config.default_selection.category),
        args.status.unwrap_or(config.default_selection.status),
    );
    let view = reports::build_view(dataset.records(), &selection, years, config.locale);

    reports::emit_report(&mut io::stdout(), &mut log, &args.output_dir, &view, args.json)?;

    Ok(())
}

/// Every selection combination in one pass over the cached dataset
async fn run_sweep(args: &Args, cache: &Cache, config: &Config) -> Result<()> {
    let mut log = progress_writer(args);
    let (dataset, years) = load_dataset(args, cache, config, &mut log).await?;

    let views: Vec<_> = FilterSelection::all_combinations()
        .iter()
        .map(|selection| reports::build_view(dataset.records(), selection, years, config.locale))
        .collect();

    reports::emit_sweep(&mut io::stdout(), &mut log, &args.output_dir, &views, args.json)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_raises_only_this_crate() {
        let filter = log_filter(true).unwrap().to_string();
        assert!(filter.contains("member_sales=debug"));
        assert!(!filter.split(',').any(|d| d == "debug"));
    }

    #[test]
    fn test_json_flag_after_subcommand() {
        let args = Args::try_parse_from(["member-sales", "sweep", "--json"]).unwrap();
        assert!(args.json);
        assert!(matches!(args.command, Some(Command::Sweep)));
    }
}
