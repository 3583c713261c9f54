//! Barstream CLI — replay and cache inspection commands.
//!
//! Commands:
//! - `replay` — subscribe instruments, drain the merged bar stream, print events and a digest
//! - `cache status` — list cached instruments with row counts and date ranges

use anyhow::{bail, Context, Result};
use barstream_core::config::{CacheFormat, FeedConfig, ProviderKind};
use barstream_core::data::{CsvStore, ParquetStore, SeriesStore};
use barstream_core::domain::Granularity;
use barstream_core::engine::BarFeed;
use barstream_core::fingerprint::StreamDigest;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

#[derive(Parser)]
#[command(
    name = "barstream",
    about = "Barstream CLI — merged OHLCV bar streams for backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay one or more instruments as a single time-ordered bar stream.
    Replay {
        /// Path to a TOML feed config. Flags below override its fields.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instruments to subscribe (e.g. btcusdt ethusdt).
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        tickers: Vec<String>,

        /// First date replayed (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Replay stops before this date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Bar size: 1m, 5m, 15m, 30m, 1h, 1d, 1mo, 1w, 1y.
        #[arg(long)]
        granularity: Option<Granularity>,

        /// Cache directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Cache file format.
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Generate deterministic synthetic data instead of calling the exchange.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Track adjusted-close returns per ticker.
        #[arg(long, default_value_t = false)]
        calc_returns: bool,

        /// Print events as JSON lines.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached instruments, row counts and date ranges.
    Status {
        /// Cache directory. Defaults to ./data/crypto.
        #[arg(long, default_value = "data/crypto")]
        cache_dir: PathBuf,

        /// Cache file format.
        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Parquet,
}

impl From<FormatArg> for CacheFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Csv => CacheFormat::Csv,
            FormatArg::Parquet => CacheFormat::Parquet,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barstream_core=info,barstream=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            config,
            tickers,
            start,
            end,
            granularity,
            cache_dir,
            format,
            synthetic,
            calc_returns,
            json,
        } => {
            let mut feed_config = match config {
                Some(path) => FeedConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => {
                    if tickers.is_empty() {
                        bail!("one of --config or --tickers is required");
                    }
                    FeedConfig::new(tickers.clone())
                }
            };
            if !tickers.is_empty() {
                feed_config.tickers = tickers;
            }
            if start.is_some() {
                feed_config.start = start;
            }
            if end.is_some() {
                feed_config.end = end;
            }
            if let Some(g) = granularity {
                feed_config.granularity = g;
            }
            if let Some(dir) = cache_dir {
                feed_config.cache.dir = dir;
            }
            if let Some(f) = format {
                feed_config.cache.format = f.into();
            }
            if synthetic {
                feed_config.provider.kind = ProviderKind::Synthetic;
            }
            if calc_returns {
                feed_config.calc_adj_returns = true;
            }
            feed_config.validate()?;
            run_replay(&feed_config, json)
        }
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir, format } => run_cache_status(&cache_dir, format),
        },
    }
}

fn run_replay(config: &FeedConfig, json: bool) -> Result<()> {
    let hash = config.config_hash();
    let span = info_span!("replay", config = %&hash[..12]);
    let store = config.build_series_store(&span)?;
    let mut feed = BarFeed::open(config, store, span.clone());

    if feed.registry().is_empty() {
        bail!("no instrument could be loaded");
    }

    let mut digest = StreamDigest::new();
    let mut rejected = 0u64;
    for item in feed.by_ref() {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                warn!(parent: &span, error = %e, "event dropped");
                rejected += 1;
                continue;
            }
        };
        digest.update(&event);
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!(
                "{}  {:<10} o={:.4} h={:.4} l={:.4} c={:.4} v={}",
                event.time.format("%Y-%m-%d %H:%M:%S"),
                event.ticker,
                event.open,
                event.high,
                event.low,
                event.close,
                event.volume
            );
        }
    }

    info!(parent: &span, events = digest.events(), rejected, "stream exhausted");
    print_summary(&feed, &digest, rejected, json)?;
    Ok(())
}

fn print_summary(feed: &BarFeed, digest: &StreamDigest, rejected: u64, json: bool) -> Result<()> {
    if json {
        let summary = serde_json::json!({
            "events": digest.events(),
            "rejected": rejected,
            "digest": digest.hex(),
            "tickers": feed.registry().snapshot(),
        });
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    }

    println!();
    println!("Events:  {}", digest.events());
    if rejected > 0 {
        println!("Dropped: {rejected}");
    }
    println!("Digest:  {}", digest.hex());
    println!();
    println!("{:<12} {:<20} {:>14} {:>10}", "Ticker", "Last Bar", "Close", "Return");
    println!("{}", "-".repeat(59));
    for (ticker, state) in feed.registry().snapshot() {
        let ret = state
            .adj_close_ret
            .map(|r| format!("{:+.4}%", r * 100.0))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<12} {:<20} {:>14.4} {:>10}",
            ticker,
            state.timestamp.format("%Y-%m-%d %H:%M"),
            state.close,
            ret
        );
    }
    Ok(())
}

fn run_cache_status(cache_dir: &Path, format: FormatArg) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let store: Box<dyn SeriesStore> = match CacheFormat::from(format) {
        CacheFormat::Csv => Box::new(CsvStore::new(cache_dir)),
        CacheFormat::Parquet => Box::new(ParquetStore::new(cache_dir)),
    };

    let instruments = store.instruments()?;
    if instruments.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {} ({})", cache_dir.display(), store.name());
    println!("Instruments: {}", instruments.len());
    println!();
    println!("{:<14} {:<25} {:>10}", "Instrument", "Date Range", "Rows");
    println!("{}", "-".repeat(51));
    for instrument in &instruments {
        match store.get(instrument) {
            Ok(bars) => {
                let range = match (bars.first(), bars.last()) {
                    (Some(first), Some(last)) => format!(
                        "{} to {}",
                        first.timestamp.date_naive(),
                        last.timestamp.date_naive()
                    ),
                    _ => "(empty)".into(),
                };
                println!("{:<14} {:<25} {:>10}", instrument, range, bars.len());
            }
            Err(e) => println!("{:<14} (unreadable: {e})", instrument),
        }
    }

    Ok(())
}
