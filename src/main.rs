use anyhow::{bail, Context, Result};
use clap::Parser;
use quakefeed::config::Config;
use quakefeed::feed::{FeedRecord, HttpFetcher, ParsePolicy, TimeZonePolicy};
use quakefeed::{FeedLoader, LoadResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Get the config file path (~/.config/quakefeed/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("quakefeed")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "quakefeed", about = "Fetch an earthquake feed and print display-ready records")]
struct Args {
    /// Feed URL (overrides the config file)
    #[arg(long)]
    url: Option<String>,

    /// Config file to read instead of ~/.config/quakefeed/config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Timezone for dates and times: utc, local or an offset like +05:30
    #[arg(long, value_name = "ZONE")]
    timezone: Option<TimeZonePolicy>,

    /// Drop malformed entries instead of failing the whole load
    #[arg(long)]
    skip_malformed: bool,

    /// Print records as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the feed
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(url) = args.url {
        config.feed_url = url;
    }
    if let Some(tz) = args.timezone {
        config.timezone = tz;
    }
    if args.skip_malformed {
        config.parse_policy = ParsePolicy::SkipMalformed;
    }

    let fetcher = HttpFetcher::new(config.fetch_options()).context("Failed to build HTTP client")?;
    tracing::debug!(
        connect_timeout = ?fetcher.options().connect_timeout,
        read_timeout = ?fetcher.options().read_timeout,
        "HTTP client ready"
    );
    let (mut loader, mut events) = FeedLoader::new(Arc::new(fetcher), config.parse_options());

    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<LoadResult>();
    loader.set_observer(move |result: &LoadResult| {
        let _ = result_tx.send(result.clone());
    });

    loader.start(&config.feed_url);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        if let Ok(result) = result_rx.try_recv() {
            break result;
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Received interrupt, cancelling load");
                loader.reset();
                return Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("Feed loader stopped without a result");
                };
                let url = event.url().to_string();
                if !loader.handle_event(event) {
                    tracing::debug!(url = %url, "Dropped superseded load result");
                }
            }
        }
    };

    match result {
        Ok(records) => print_records(&records, args.json),
        Err(e) => bail!("Failed to load {} ({:?}): {}", config.feed_url, e.kind(), e),
    }
}

fn print_records(records: &[FeedRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No earthquakes in feed");
        return Ok(());
    }

    let offset_width = records
        .iter()
        .map(|r| r.offset_display.chars().count())
        .max()
        .unwrap_or(0);

    for record in records {
        println!(
            "{:>5}  {:<width$}  {}  ({} {})",
            record.magnitude_display,
            record.offset_display,
            record.primary_location,
            record.date_display,
            record.time_display,
            width = offset_width,
        );
        println!("       {}", record.detail_url);
    }
    Ok(())
}
