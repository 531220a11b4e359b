//! Sumi-Swarm main entry point
//!
//! Runs a crawl job through the whole pipeline in one process.

use clap::Parser;
use std::path::PathBuf;
use sumi_swarm::config::{load_config_with_hash, Config};
use sumi_swarm::metrics::{print_frontier_stats, print_snapshot};
use sumi_swarm::{health, CrawlJob, Pipeline};
use tracing_subscriber::EnvFilter;

/// Sumi-Swarm: a distributed, polite crawl and index pipeline
///
/// Crawls from a job's seed URLs while respecting robots.txt, per-domain
/// rate limits and the job's domain policy, and indexes every fetched page
/// into a searchable SQLite database.
#[derive(Parser, Debug)]
#[command(name = "sumi-swarm")]
#[command(version = "1.0.0")]
#[command(about = "A polite crawl and index pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// JSON job file; overrides the [job] table of the config
    #[arg(long, value_name = "FILE")]
    job: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and job and show what would be crawled
    #[arg(long)]
    dry_run: bool,

    /// Node id prefix used in progress metrics
    #[arg(long, value_name = "ID")]
    node_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let job = match &cli.job {
        Some(path) => CrawlJob::load(path)?,
        None => config
            .job
            .clone()
            .ok_or("no job given: pass --job FILE or add a [job] table to the config")?,
    };

    if cli.dry_run {
        print_dry_run(&config, &job);
        return Ok(());
    }

    handle_crawl(config, job, cli.node_id).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_swarm=info,warn"),
            1 => EnvFilter::new("sumi_swarm=debug,info"),
            2 => EnvFilter::new("sumi_swarm=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn print_dry_run(config: &Config, job: &CrawlJob) {
    println!("=== Sumi-Swarm Dry Run ===\n");

    println!("Job:");
    println!("  Max depth: {}", job.max_depth);
    println!("  Max URLs: {}", job.max_urls);
    println!("  Respect robots.txt: {}", job.respect_robots);
    println!("  Allowed domains: {}", list_or_any(&job.allow_domains));
    println!("  Denied domains: {}", list_or_any(&job.deny_domains));

    println!("\nSeeds ({}):", job.seed_urls.len());
    for seed in &job.seed_urls {
        println!("  - {}", seed);
    }

    println!("\nCrawler:");
    println!("  Worker slots: {}", config.crawler.worker_slots);
    println!(
        "  Politeness: {} req/s per domain (burst {})",
        config.crawler.requests_per_second, config.crawler.burst
    );
    println!("  Fetch timeout: {}ms", config.crawler.fetch_timeout_ms);
    println!("  User agent: {}", config.user_agent.header_value());

    println!("\nIndexer:");
    println!(
        "  Batches of {} or every {}ms",
        config.indexer.batch_size, config.indexer.batch_window_ms
    );
    println!("  Worker slots: {}", config.indexer.worker_slots);
    println!(
        "  Retry budgets: crawler {}ms, indexer {}ms (ack deadline {}ms)",
        config.crawler.task_budget().as_millis(),
        config.indexer.hold_budget().as_millis(),
        config.queue.ack_deadline_ms
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Blobs: {}", config.output.blob_dir);

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", job.seed_urls.len());
}

fn list_or_any(domains: &[String]) -> String {
    if domains.is_empty() {
        "(any)".to_string()
    } else {
        domains.join(", ")
    }
}

/// Runs the job and prints the final metrics
async fn handle_crawl(
    config: Config,
    job: CrawlJob,
    node_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.health.bind.clone();
    let pipeline = Pipeline::open(config)?.with_node_prefix(node_id);

    let health_server = match bind {
        Some(bind) => {
            let server = health::serve(pipeline.health(), &bind)?;
            let handle = server.handle();
            tokio::spawn(server);
            Some(handle)
        }
        None => None,
    };

    tracing::info!(
        "Starting crawl of {} seeds (max depth {}, max {} URLs)",
        job.seed_urls.len(),
        job.max_depth,
        job.max_urls
    );

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let outcome = pipeline.run(job, ctrl_c).await;

    if let Some(handle) = health_server {
        handle.stop(true).await;
    }

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    print_snapshot(&outcome.metrics);
    print_frontier_stats(&outcome.frontier);
    println!("\nIndexed documents: {}", outcome.indexed_documents);

    match outcome.fatal {
        Some(reason) => {
            tracing::error!("Crawl stopped on a fatal error: {}", reason);
            Err(reason.into())
        }
        None => {
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
    }
}
