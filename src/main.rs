use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scraper::Html;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cinematheque_scrape::feed::{CHANNEL_DESCRIPTION, CHANNEL_TITLE};
use cinematheque_scrape::{
    BatchedFetcher, CacheGateway, CinemaSite, RedisStore, ScheduleExtractor, ScheduleService,
    Settings, generate_rss,
};

#[derive(Debug, Parser)]
#[command(name = "cinematheque", about = "Tel Aviv Cinematheque showtime aggregator")]
struct Cli {
    /// Config file (defaults to ./cinematheque.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of days to fetch, starting today
    #[arg(long, global = true)]
    days: Option<usize>,

    /// Concurrent requests per batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[arg(long, global = true)]
    redis_url: Option<String>,

    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the aggregate as JSON, from cache when available
    Aggregate,
    /// Fetch fresh data, print it and replace the cached copy
    Refresh,
    /// Remove the cached aggregate
    ClearCache,
    /// Print movies from the program category pages as JSON
    Categories,
    /// Extract movies from a saved listing page
    Parse {
        file: PathBuf,
        /// Page URL, used when the page has no date header
        #[arg(long)]
        url: Option<String>,
        /// Parse the older block layout
        #[arg(long)]
        legacy: bool,
    },
    /// Write the aggregate as an RSS feed
    Feed {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() {
    // Logs on stderr, stdout carries the JSON output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings, config::ConfigError> {
    let mut settings = Settings::load_from(cli.config.as_deref())?;
    if let Some(days) = cli.days {
        settings.days_to_fetch = days;
    }
    if let Some(batch_size) = cli.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(url) = &cli.redis_url {
        settings.redis_url = Some(url.clone());
    }
    if let Some(url) = &cli.base_url {
        settings.source_base_url = url.clone();
    }
    Ok(settings)
}

fn build_service(settings: &Settings) -> Result<ScheduleService, Box<dyn std::error::Error>> {
    let site = CinemaSite::new(&settings.source_base_url)?;
    let fetcher = BatchedFetcher::new(
        Arc::new(site),
        ScheduleExtractor::new()?,
        settings.fetcher_config(),
    );
    let store = RedisStore::new(settings.redis_url.as_deref())?;
    let cache = CacheGateway::new(Arc::new(store)).with_ttl(settings.cache_ttl());
    Ok(ScheduleService::new(fetcher, cache))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    if let Command::Parse { file, url, legacy } = &cli.command {
        let html = std::fs::read_to_string(file)?;
        let document = Html::parse_document(&html);
        let extractor = ScheduleExtractor::new()?;
        let movies = if *legacy {
            extractor.extract_legacy(&document)
        } else {
            extractor.extract(&document, url.as_deref())
        };
        info!(movies = movies.len(), file = %file.display(), "parsed saved page");
        println!("{}", serde_json::to_string_pretty(&movies)?);
        return Ok(());
    }

    let settings = load_settings(&cli)?;
    let service = build_service(&settings)?;

    match &cli.command {
        Command::Aggregate => {
            let movies = service.get_aggregate().await;
            println!("{}", serde_json::to_string_pretty(&movies)?);
        }
        Command::Refresh => {
            let movies = service.force_refresh().await;
            println!("{}", serde_json::to_string_pretty(&movies)?);
        }
        Command::Categories => {
            let movies = service.get_category_movies().await;
            println!("{}", serde_json::to_string_pretty(&movies)?);
        }
        Command::ClearCache => {
            let outcome = service.delete_cached_aggregate().await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Command::Feed { output } => {
            let movies = service.get_aggregate().await;
            let link = format!("{}/shown/", settings.source_base_url.trim_end_matches('/'));
            let rss = generate_rss(&movies, CHANNEL_TITLE, &link, CHANNEL_DESCRIPTION)?;
            match output {
                Some(path) => {
                    std::fs::write(path, rss)?;
                    info!(path = %path.display(), movies = movies.len(), "rss feed written");
                }
                None => println!("{rss}"),
            }
        }
        Command::Parse { .. } => {}
    }

    service.flush_pending_writes().await;
    Ok(())
}
