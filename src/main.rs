//! apteka - resumable pharmacy catalogue crawler CLI.

use anyhow::Context;
use apteka::config::Config;
use apteka::crawler::CrawlOrchestrator;
use apteka::models::RunState;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "apteka",
    version,
    about = "Crawl a pharmacy storefront into SQLite and flat-file exports",
    long_about = "Discovers the category tree, enumerates products per category and \
                  extracts typed product records. Progress is checkpointed after every \
                  item; rerun with --resume to continue an interrupted crawl."
)]
struct Cli {
    /// TOML config file (flags below override it)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Storefront root URL
    #[arg(long)]
    base_url: Option<String>,

    /// Directory for the database, checkpoint and exports
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Minimum seconds between requests (shared by all workers)
    #[arg(long)]
    delay: Option<f64>,

    /// Concurrent workers
    #[arg(long)]
    workers: Option<usize>,

    /// Take at most this many products per category
    #[arg(long)]
    max_products: Option<u64>,

    /// Skip product detail pages (listing-card data only)
    #[arg(long)]
    no_detailed: bool,

    /// Continue from the last checkpoint
    #[arg(long)]
    resume: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log output format: text or json
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(Config, bool)> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::from_env().context("loading config from environment")?,
        };

        if let Some(base_url) = self.base_url {
            config.crawler.base_url = base_url;
        }
        if let Some(output_dir) = self.output_dir {
            config.output.output_dir = output_dir;
        }
        if let Some(delay) = self.delay {
            config.crawler.delay_secs = delay;
        }
        if let Some(workers) = self.workers {
            config.crawler.workers = workers;
        }
        if let Some(max_products) = self.max_products {
            config.crawler.max_products = Some(max_products);
        }
        if self.no_detailed {
            config.crawler.detailed = false;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        config.logging.level = match self.verbose {
            0 => config.logging.level,
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        };

        config.validate().context("invalid configuration")?;
        Ok((config, self.resume))
    }
}

fn setup_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("apteka={level},warn")));
    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, resume) = Cli::parse().into_config()?;
    setup_tracing(&config.logging.level, &config.logging.format);

    let output_dir = config.output.output_dir.clone();
    let orchestrator = CrawlOrchestrator::new(config, resume).context("initializing crawler")?;
    let summary = orchestrator.run().await.context("running crawl")?;

    println!();
    println!("Crawl {}", summary.state);
    println!("  categories : {}", summary.categories_processed);
    println!("  products   : {}", summary.products_extracted);
    println!("  pages      : {}", summary.pages_fetched);
    println!("  failed     : {}", summary.failed);
    println!("  skipped    : {}", summary.skipped);
    println!("  duration   : {:.1}s", summary.duration_secs);
    println!("  output     : {}", output_dir.display());

    match summary.state {
        RunState::Paused => {
            println!("\nRun paused; continue with --resume");
            Ok(())
        }
        RunState::Aborted => anyhow::bail!("crawl aborted, see log for the reason"),
        _ => Ok(()),
    }
}
