//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use sitecrawler_crawler::{PageCrawler, WorkerPool};
use sitecrawler_shared::{AppConfig, CrawlConfig, config_file_path, init_config, load_config};

use crate::render;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// sitecrawler — map one host's link graph with reachability status.
#[derive(Parser)]
#[command(
    name = "sitecrawler",
    version,
    about = "Crawl a website and report every same-host link with its reachability status.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Report output format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Sitemap,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl a website and print its link report.
    Crawl {
        /// Root URL to crawl; externals links are probed but never entered.
        url: String,

        /// Maximum crawl depth; zero or negative means unbounded.
        #[arg(short, long)]
        depth: Option<i64>,

        /// Worker pool size (maximum concurrent page crawls).
        #[arg(short, long)]
        workers: Option<u32>,

        /// HTTP client timeout in seconds.
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Output format: sitemap (XML) or json.
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Print elapsed wall time to stderr when done.
        #[arg(long)]
        timed: bool,
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
    /// Print the config file path.
    Path,
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
        0 => "sitecrawler=info",
        1 => "sitecrawler=debug",
        _ => "sitecrawler=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Crawl {
            url,
            depth,
            workers,
            timeout,
            format,
            timed,
        } => cmd_crawl(&url, depth, workers, timeout, format, timed).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Path => cmd_config_path().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Crawl
// ---------------------------------------------------------------------------

async fn cmd_crawl(
    url: &str,
    depth: Option<i64>,
    workers: Option<u32>,
    timeout: Option<u64>,
    format: Option<OutputFormat>,
    timed: bool,
) -> Result<()> {
    let start = Instant::now();

    let config = load_config()?;
    let mut crawl_config = CrawlConfig::from(&config);
    if let Some(depth) = depth {
        crawl_config.depth = depth;
    }
    if let Some(workers) = workers {
        crawl_config.workers = workers;
    }
    if let Some(secs) = timeout {
        crawl_config.timeout = Duration::from_secs(secs);
    }

    let format = match format {
        Some(format) => format,
        None => match crawl_config.format.as_str() {
            "json" => OutputFormat::Json,
            "sitemap" => OutputFormat::Sitemap,
            other => return Err(eyre!("unknown output format '{other}' in config")),
        },
    };

    let target = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    if target.host_str().is_none() {
        return Err(eyre!("URL '{url}' has no host to crawl"));
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("sitecrawler/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(crawl_config.timeout)
        .build()
        .map_err(|e| eyre!("failed to build HTTP client: {e}"))?;

    let cancel = CancellationToken::new();

    // First Ctrl-C stops dispatch and lets in-flight pages drain; the
    // report printed below covers everything finished by then.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping crawl");
                cancel.cancel();
            }
        });
    }

    let pool = Arc::new(WorkerPool::new(
        crawl_config.workers as usize,
        cancel.child_token(),
    ));

    info!(
        target = %target,
        depth = crawl_config.depth,
        workers = crawl_config.workers,
        "crawling"
    );

    let crawler = PageCrawler {
        target,
        max_depth: crawl_config.depth,
        client,
        cancel,
    };

    let mut reports = Vec::new();
    let mut stream = crawler.run(Some(Arc::clone(&pool)));
    while let Some(report) = stream.recv().await {
        reports.push(report);
    }
    pool.stop().await;

    match format {
        OutputFormat::Sitemap => print!("{}", render::render_sitemap(&reports)),
        OutputFormat::Json => println!("{}", render::render_json(&reports)?),
    }

    if timed {
        eprintln!("\nFinished: {:.3}s.", start.elapsed().as_secs_f64());
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_path() -> Result<()> {
    let path = config_file_path()?;
    println!("{}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    print!("{toml_str}");
    Ok(())
}
