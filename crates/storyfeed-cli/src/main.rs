//! Storyfeed CLI - browse a paginated story feed from the terminal.
//!
//! Stories are cached locally, so `scroll` and `status` keep working
//! without a network connection once a page has been fetched.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storyfeed_core::{
    ApiClient, AuthToken, CacheHandle, Config, LoadState, LocationFilter, NewStory, PageStore,
    Story, StoryFeed,
};

// ============================================================================
// Constants
// ============================================================================

/// Directory for rolling log files; unset means stderr only
const LOG_DIR_ENV: &str = "STORYFEED_LOG_DIR";

const LOG_FILE_PREFIX: &str = "storyfeed.log";

/// Stories shown by `scroll` when no count is given
const DEFAULT_SCROLL_COUNT: usize = 10;

const USAGE: &str = "\
Usage: storyfeed <command>

Commands:
  refresh          Reload the first page of the feed
  scroll [count]   Print the first <count> stories, fetching pages as needed
  status           Show what is cached and how old it is
  map              Print stories that carry a location, as JSON lines
  post <photo> <description> [--lat <lat> --lon <lon>]
                   Upload a story, then refresh the feed
  clear            Empty the local cache (logout)
  init             Write the current settings to the config file

Environment:
  STORYFEED_TOKEN    Bearer token for the stories API
  STORYFEED_API_URL  Override the API root
  STORYFEED_LOG_DIR  Also write daily log files to this directory
  RUST_LOG           Log filter (default: warn)";

enum Command {
    Refresh,
    Scroll(usize),
    Status,
    Map,
    Post(PostArgs),
    Clear,
    Init,
}

struct PostArgs {
    photo: PathBuf,
    description: String,
    location: Option<(f64, f64)>,
}

impl PostArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let (Some(photo), Some(description)) = (args.first(), args.get(1)) else {
            bail!("post needs a photo path and a description\n\n{USAGE}");
        };

        let mut lat = None;
        let mut lon = None;
        let mut rest = args[2..].iter();
        while let Some(flag) = rest.next() {
            let slot = match flag.as_str() {
                "--lat" => &mut lat,
                "--lon" => &mut lon,
                other => bail!("Unknown post option: {other}"),
            };
            let value = rest
                .next()
                .with_context(|| format!("{flag} needs a value"))?;
            let value: f64 = value
                .parse()
                .with_context(|| format!("Invalid coordinate for {flag}: {value}"))?;
            *slot = Some(value);
        }

        let location = match (lat, lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            (None, None) => None,
            _ => bail!("--lat and --lon must be given together"),
        };

        Ok(Self {
            photo: PathBuf::from(photo),
            description: description.clone(),
            location,
        })
    }
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            bail!("{USAGE}");
        };
        match name.as_str() {
            "refresh" => Ok(Command::Refresh),
            "scroll" => {
                let count = match args.get(1) {
                    Some(n) => n
                        .parse()
                        .with_context(|| format!("Invalid story count: {n}"))?,
                    None => DEFAULT_SCROLL_COUNT,
                };
                Ok(Command::Scroll(count))
            }
            "status" => Ok(Command::Status),
            "map" => Ok(Command::Map),
            "post" => Ok(Command::Post(PostArgs::parse(&args[1..])?)),
            "clear" | "logout" => Ok(Command::Clear),
            "init" => Ok(Command::Init),
            "-h" | "--help" | "help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("Unknown command: {other}\n\n{USAGE}"),
        }
    }
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the program.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=storyfeed_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir.trim(), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = Config::load().context("Failed to load config")?;
    info!(api = %config.api_base_url, page_size = config.page_size(), "Storyfeed starting");

    let cache_dir = config.cache_dir()?;
    let cache = CacheHandle::new(cache_dir, config.feed_key.clone());

    match command {
        Command::Status => status(&cache).await,
        Command::Refresh => refresh(&config, &cache).await,
        Command::Scroll(count) => scroll(&config, &cache, count).await,
        Command::Map => map(&config).await,
        Command::Post(post_args) => post(&config, &cache, post_args).await,
        Command::Clear => clear(&config, &cache).await,
        Command::Init => init(&config),
    }
}

fn require_token() -> Result<AuthToken> {
    AuthToken::from_env().context("STORYFEED_TOKEN is not set; export a bearer token first")
}

async fn open_feed(config: &Config, cache: &CacheHandle, token: AuthToken) -> Result<StoryFeed> {
    let client = ApiClient::new(&config.api_base_url)?;
    let feed = StoryFeed::open(Arc::new(client), cache, token)
        .await
        .context("Failed to open feed cache")?
        .with_prefetch_distance(config.prefetch_distance());
    Ok(feed)
}

fn print_story(position: usize, story: &Story) {
    println!("{:>4}. {} ({})", position + 1, story.name, story.formatted_date());
    if !story.description.is_empty() {
        println!("      {}", story.description.lines().next().unwrap_or_default());
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn status(cache: &CacheHandle) -> Result<()> {
    let store: Arc<PageStore> = cache.store().await.context("Failed to open feed cache")?;
    let snapshot = store.snapshot();

    println!("Feed:          {}", store.key());
    if let Some(path) = store.path() {
        println!("Cache file:    {}", path.display());
    }
    println!("Cached:        {} stories", snapshot.len());
    println!(
        "Last fetched:  {}{}",
        snapshot.age_display(),
        if snapshot.is_stale() { " (stale)" } else { "" }
    );
    match snapshot.cursor.next_page {
        Some(page) => println!("Next page:     {page}"),
        None if snapshot.cached_at.is_some() => println!("Next page:     none (end of feed)"),
        None => println!("Next page:     not fetched yet"),
    }
    Ok(())
}

async fn refresh(config: &Config, cache: &CacheHandle) -> Result<()> {
    let feed = open_feed(config, cache, require_token()?).await?;
    let success = feed.refresh(config.page_size()).await?;

    println!(
        "Fetched {} stories{}",
        success.fetched,
        if success.end_of_pagination_reached {
            " (end of feed)"
        } else {
            ""
        }
    );
    feed.shutdown();
    Ok(())
}

async fn scroll(config: &Config, cache: &CacheHandle, count: usize) -> Result<()> {
    let feed = open_feed(config, cache, require_token()?).await?;
    let mut paged = feed.observe(config.page_size());

    // Report background loads on stderr while stories print on stdout
    let mut states = paged.load_state_stream().skip(1).boxed();
    let progress = tokio::spawn(async move {
        while let Some(states) = states.next().await {
            if let LoadState::Error(e) = &states.append {
                eprintln!("Loading more stories failed: {e}");
            }
        }
    });

    let mut shown = 0;
    for position in 0..count {
        let story = match paged.get(position).await {
            Ok(Some(story)) => story,
            Ok(None) => break,
            Err(e) if shown > 0 => {
                eprintln!("Stopped after {shown} stories: {e}");
                break;
            }
            Err(e) => return Err(e).context("Failed to load the feed"),
        };
        print_story(position, &story);
        shown += 1;
    }

    if paged.end_of_pagination_reached() && shown < count {
        println!("-- end of feed --");
    }
    if paged.is_stale() {
        eprintln!("Showing cached stories from {}", paged.age_display());
    }

    feed.shutdown();
    progress.abort();
    Ok(())
}

async fn map(config: &Config) -> Result<()> {
    let token = require_token()?;
    let client = ApiClient::new(&config.api_base_url)?;
    let stories = client
        .fetch_stories(LocationFilter::WithLocation, &token)
        .await
        .context("Failed to fetch stories with location")?;

    eprintln!("{} stories with a location", stories.len());
    for story in stories.iter().filter(|s| s.location().is_some()) {
        println!("{}", serde_json::to_string(story)?);
    }
    Ok(())
}

async fn post(config: &Config, cache: &CacheHandle, args: PostArgs) -> Result<()> {
    let token = require_token()?;
    let story = NewStory {
        photo: std::fs::read(&args.photo)
            .with_context(|| format!("Failed to read photo {}", args.photo.display()))?,
        file_name: file_name(&args.photo),
        description: args.description,
        location: args.location,
    };

    let client = ApiClient::new(&config.api_base_url)?;
    client
        .add_story(story, &token)
        .await
        .context("Failed to post story")?;
    println!("Story posted");

    // The new story lands on the first page
    let feed = open_feed(config, cache, token).await?;
    let refreshed = feed.refresh(config.page_size()).await;
    feed.shutdown();
    match refreshed {
        Ok(success) => println!("Feed refreshed ({} stories)", success.fetched),
        Err(e) => eprintln!("Story posted, but refreshing the feed failed: {e}"),
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo.jpg".to_string())
}

async fn clear(config: &Config, cache: &CacheHandle) -> Result<()> {
    // Clearing never touches the network, so a missing token is fine
    let token = AuthToken::from_env().unwrap_or_else(|| AuthToken::new(String::new()));
    let feed = open_feed(config, cache, token).await?;
    feed.clear().await.context("Failed to clear feed cache")?;
    feed.shutdown();
    println!("Cache cleared");
    Ok(())
}

fn init(config: &Config) -> Result<()> {
    let path = config.save().context("Failed to save config")?;
    println!("Wrote {}", path.display());
    Ok(())
}
