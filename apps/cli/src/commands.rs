//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use centipede_core::Registry;
use centipede_crawler::Fetcher;
use centipede_shared::{
    AppConfig, CentipedeError, Entry, PipelineConfig, init_config, load_config, load_config_from,
};
use centipede_storage::Storage;

use crate::atom;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// centipede: crawl web sources into normalized feed entries.
#[derive(Parser)]
#[command(
    name = "centipede",
    version,
    about = "Crawl web sources into normalized, cached feed entries.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.centipede/centipede.toml.
    #[arg(long, global = true, env = "CENTIPEDE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache database to use instead of the configured one.
    #[arg(long, global = true, env = "CENTIPEDE_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Entry output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
    Atom,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List registered feeds.
    List,

    /// Crawl one feed and print its entries.
    Crawl {
        /// Feed id (see `centipede list`).
        id: String,

        /// Output format for the entries.
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "centipede=info",
        1 => "centipede=debug",
        _ => "centipede=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so printed entries stay machine-readable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::List => cmd_list(config_path, cli.db.as_deref()).await,
        Command::Crawl { id, format } => {
            cmd_crawl(config_path, cli.db.as_deref(), &id, format).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Load config, open the cache and build every feed.
async fn open_registry(config_path: Option<&Path>, db: Option<&Path>) -> Result<Registry> {
    let config = resolve_config(config_path)?;
    let mut pipeline = PipelineConfig::from(&config);
    if let Some(db) = db {
        pipeline.database_path = db.to_path_buf();
    }

    let storage = Storage::open(&pipeline.database_path)
        .await
        .wrap_err_with(|| format!("opening cache at {}", pipeline.database_path.display()))?;
    let fetcher = Fetcher::new(pipeline.fetch_timeout)?;

    Ok(Registry::from_config(
        &config,
        &pipeline,
        Arc::new(storage),
        fetcher,
    )?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_list(config_path: Option<&Path>, db: Option<&Path>) -> Result<()> {
    let registry = open_registry(config_path, db).await?;
    info!(feeds = registry.len(), "listing feeds");

    println!();
    for feed in registry.feeds() {
        let info = feed.info();
        let cached = feed.cache().len().await?;
        println!("  {:<20} {}", info.id, info.title);
        println!("  {:<20} {} ({cached} cached)", "", info.url);
    }
    println!();
    Ok(())
}

async fn cmd_crawl(
    config_path: Option<&Path>,
    db: Option<&Path>,
    id: &str,
    format: OutputFormat,
) -> Result<()> {
    let registry = open_registry(config_path, db).await?;
    let feed = registry.get(id).map_err(|e| match e {
        CentipedeError::UnknownFeed(id) => {
            let known: Vec<_> = registry.feeds().map(|f| f.id()).collect();
            eyre!("unknown feed '{id}' (known: {})", known.join(", "))
        }
        other => other.into(),
    })?;

    let spinner = spinner(&format!("Crawling {}", feed.info().title));
    let count = feed.crawl().await;
    spinner.finish_and_clear();
    info!(feed = id, entries = count, "crawled");

    let entries = feed.entries().await;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => print_entries(&entries),
        OutputFormat::Atom => {
            println!("{}", atom::render_feed(feed.info(), &entries, Utc::now())?)
        }
    }
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

fn print_entries(entries: &[Entry]) {
    println!();
    if entries.is_empty() {
        println!("  (no entries)");
    }
    for entry in entries {
        println!("  {}", entry.title);
        println!("    link: {}", entry.link);
        println!("    id:   {}", entry.id);
        if let Some(stamp) = entry.stamp {
            println!("    time: {}", stamp.timestamp.to_rfc3339());
        }
        println!("    size: {} bytes", entry.content.len());
        println!();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
