use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rednote::config::{split_list, Config};
use rednote::crawler::Crawler;
use rednote::storage::JsonStore;
use rednote::utils::cancel::cancel_pair;

#[derive(Parser)]
#[command(
    name = "rednote",
    version,
    about = "Xiaohongshu notes, comments and creators crawler",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl notes by keyword, note URL or creator
    Crawl {
        /// Crawler type (search, detail, creator)
        #[arg(short = 't', long = "type")]
        crawler_type: Option<String>,

        /// Comma-separated search keywords
        #[arg(short, long)]
        keywords: Option<String>,

        /// Comma-separated note URLs or ids
        #[arg(long)]
        urls: Option<String>,

        /// Comma-separated creator profile URLs or ids
        #[arg(long)]
        creators: Option<String>,

        /// Maximum notes per keyword or creator
        #[arg(short, long)]
        max_notes: Option<usize>,

        /// Maximum comments per note
        #[arg(long)]
        max_comments: Option<usize>,

        /// Skip comment collection
        #[arg(long)]
        no_comments: bool,

        /// Concurrent comment walks
        #[arg(long)]
        concurrency: Option<usize>,

        /// Login type (qrcode, cookie)
        #[arg(long)]
        login_type: Option<String>,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Stop the crawl after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize tracing/logging
    let log_format = cli.log_format.clone().unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("rednote starting");

    match cli.command {
        Commands::Crawl {
            crawler_type,
            keywords,
            urls,
            creators,
            max_notes,
            max_comments,
            no_comments,
            concurrency,
            login_type,
            headless,
            timeout,
            output,
        } => {
            if let Some(kind) = crawler_type {
                config.crawler.crawler_type = kind;
            }
            if let Some(raw) = keywords {
                config.crawler.keywords = split_list(&raw);
            }
            if let Some(raw) = urls {
                config.crawler.note_urls = split_list(&raw);
            }
            if let Some(raw) = creators {
                config.crawler.creator_urls = split_list(&raw);
            }
            if let Some(n) = max_notes {
                config.crawler.max_notes = n;
            }
            if let Some(n) = max_comments {
                config.crawler.max_comments_per_note = n;
            }
            if no_comments {
                config.crawler.enable_comments = false;
            }
            if let Some(n) = concurrency {
                config.crawler.max_concurrency = n;
            }
            if let Some(kind) = login_type {
                config.browser.login_type = kind;
            }
            if headless {
                config.browser.headless = true;
            }
            if let Some(dir) = output {
                config.storage.output_dir = dir;
            }

            tracing::info!(
                crawler_type = %config.crawler.crawler_type,
                keywords = ?config.crawler.keywords,
                max_notes = %config.crawler.max_notes,
                enable_comments = %config.crawler.enable_comments,
                output = %config.storage.output_dir.display(),
                "Starting crawl command"
            );
            crawl(config, timeout).await?;
        }

        Commands::ShowConfig => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            println!("{rendered}");
        }
    }

    tracing::info!("rednote completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("rednote=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("rednote={level},warn"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rednote=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn crawl(config: Config, timeout: Option<u64>) -> Result<()> {
    config.validate()?;

    let (handle, cancel) = cancel_pair();
    let handle = Arc::new(handle);

    {
        let handle = Arc::clone(&handle);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping crawl");
                handle.cancel();
            }
        });
    }
    if let Some(secs) = timeout {
        handle.cancel_after(Duration::from_secs(secs));
    }

    let store = Arc::new(
        JsonStore::open(&config.storage.output_dir, config.write_timeout())
            .await
            .with_context(|| format!("Failed to open output dir {}", config.storage.output_dir.display()))?,
    );
    let page = rednote::browser::launch(&config.browser)
        .await
        .context("Failed to launch browser")?;

    let crawler = Crawler::start(&config, page, store, cancel).await?;
    let stats = crawler.run().await?;

    println!("Crawl finished:");
    println!("  Notes saved: {}", stats.notes_saved);
    println!("  Notes failed: {}", stats.notes_failed);
    println!("  Comments saved: {}", stats.comments_saved);
    println!("  Creators saved: {}", stats.creators_saved);
    Ok(())
}
