//! Xtream PVR - command line front end
//! Drives the catalog, guide and DVR clients from a saved configuration

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

use xtream_pvr::config::AppConfig;
use xtream_pvr::dvr::{parse_iso_time, DvrClient};
use xtream_pvr::epg::{format_datetime, format_time, EpgOptions};
use xtream_pvr::models::{EpgChannelId, RecurringRule, StreamFormat};
use xtream_pvr::XtreamClient;

type CliResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Xtream Codes catalog, XMLTV guide and DVR client.
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Config file (default: <config dir>/xtream_pvr/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with default settings if none exists.
    InitConfig,
    /// Check provider settings and connectivity.
    Test,
    /// List live categories.
    Categories,
    /// List live streams.
    Streams {
        /// Only this category.
        #[arg(long)]
        category: Option<u32>,
    },
    /// Fetch categories and all streams (with per-category fallback).
    Catalog,
    /// Print the playable URL of a stream.
    StreamUrl {
        id: u32,
        /// "ts" or "hls" (default: from settings).
        #[arg(long)]
        format: Option<String>,
    },
    /// Fetch the XMLTV guide and match it to the catalog.
    Epg {
        /// Show programmes of this stream id.
        #[arg(long)]
        channel: Option<u32>,
    },
    /// DVR operations.
    Dvr(DvrCommand),
}

#[derive(Args)]
struct DvrCommand {
    #[command(subcommand)]
    command: DvrSubcommands,
}

#[derive(Subcommand)]
enum DvrSubcommands {
    /// List series rules.
    SeriesRules,
    /// Record every airing of a programme.
    AddSeriesRule {
        tvg_id: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        mode: String,
    },
    DeleteSeriesRule {
        tvg_id: String,
    },
    /// List recurring rules.
    RecurringRules,
    /// Weekly timer on one channel.
    AddRecurringRule(RecurringRuleArgs),
    DeleteRecurringRule {
        id: u32,
    },
    /// List recordings.
    Recordings,
    DeleteRecording {
        id: u32,
    },
    /// Schedule a one-off recording; times as YYYY-MM-DDTHH:MM:SSZ.
    Schedule {
        channel: u32,
        start: String,
        end: String,
        title: String,
    },
}

#[derive(Args)]
struct RecurringRuleArgs {
    #[arg(long)]
    channel: u32,
    /// Comma-separated weekdays, 0 = Monday.
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u8).range(0..=6))]
    days: Vec<u8>,
    /// HH:MM:SS
    #[arg(long)]
    start_time: String,
    #[arg(long)]
    end_time: String,
    /// YYYY-MM-DD
    #[arg(long, default_value = "")]
    start_date: String,
    #[arg(long, default_value = "")]
    end_date: String,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long)]
    disabled: bool,
}

fn main() -> CliResult {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // init-config targets a file that may not exist yet
    if let Commands::InitConfig = cli.command {
        return init_config(cli.config);
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Dvr(cmd) => run_dvr(&config, cmd.command),
        command => run_provider(&config, command),
    }
}

fn init_config(path: Option<PathBuf>) -> CliResult {
    let path = match path {
        Some(p) => p,
        None => AppConfig::default_path()?,
    };
    if AppConfig::init_at(&path)? {
        println!("Wrote {}", path.display());
    } else {
        println!("{} already exists", path.display());
    }
    Ok(())
}

fn run_provider(config: &AppConfig, command: Commands) -> CliResult {
    let client = XtreamClient::new(config.provider.clone());

    match command {
        Commands::Test => {
            let status = client.test_connection()?;
            println!("OK ({})", status);
        }
        Commands::Categories => {
            for category in client.fetch_categories()? {
                println!("{:>6}  {}", category.id, category.name);
            }
        }
        Commands::Streams { category } => {
            for stream in client.fetch_streams(category.unwrap_or(0))? {
                println!(
                    "{:>6}  {:>5}  [{}]  {}",
                    stream.id, stream.number, stream.category_id, stream.name
                );
            }
        }
        Commands::Catalog => {
            let catalog = client.fetch_all_live_streams()?;
            for category in &catalog.categories {
                let count = catalog
                    .streams
                    .iter()
                    .filter(|s| s.category_id == category.id)
                    .count();
                println!("{:>6}  {:<40} {} streams", category.id, category.name, count);
            }
            println!("{} streams total", catalog.streams.len());
        }
        Commands::StreamUrl { id, format } => {
            let format = format
                .as_deref()
                .map_or(config.provider.stream_format, StreamFormat::from_name);
            let url = client
                .build_live_stream_url(id, format)
                .ok_or("cannot build stream URL from the configured server")?;
            println!("{}", url);
        }
        Commands::Epg { channel } => {
            let catalog = client.fetch_all_live_streams()?;
            let options = EpgOptions::from_settings(&config.epg);
            let guide = client.fetch_epg(&catalog.streams, &options)?;

            match channel {
                Some(id) => {
                    let key = EpgChannelId::Stream(id);
                    let epg = guide
                        .iter()
                        .find(|c| c.id == key)
                        .ok_or_else(|| format!("no guide data for stream {}", id))?;
                    println!("{} ({})", epg.display_name, epg.id);
                    for entry in epg.entries.values() {
                        println!(
                            "  {} - {}  {}",
                            format_datetime(entry.start_time),
                            format_time(entry.end_time),
                            entry.title
                        );
                    }
                }
                None => {
                    let matched = guide.iter().filter(|c| c.id.stream_id().is_some()).count();
                    for epg in &guide {
                        println!(
                            "{:<24} {:<40} {} programmes",
                            epg.id.to_string(),
                            epg.display_name,
                            epg.entries.len()
                        );
                    }
                    info!(channels = guide.len(), matched, "Guide loaded");
                }
            }
        }
        Commands::InitConfig | Commands::Dvr(_) => {}
    }
    Ok(())
}

fn run_dvr(config: &AppConfig, command: DvrSubcommands) -> CliResult {
    let client = DvrClient::new(config.dvr.clone());

    match command {
        DvrSubcommands::SeriesRules => {
            for rule in client.list_series_rules()? {
                println!("{:<32} {:<8} {}", rule.tvg_id, rule.mode, rule.title);
            }
        }
        DvrSubcommands::AddSeriesRule { tvg_id, title, mode } => {
            client.add_series_rule(&tvg_id, &title, &mode)?;
            println!("Added series rule for {}", tvg_id);
        }
        DvrSubcommands::DeleteSeriesRule { tvg_id } => {
            client.delete_series_rule(&tvg_id)?;
            println!("Deleted series rule for {}", tvg_id);
        }
        DvrSubcommands::RecurringRules => {
            for rule in client.list_recurring_rules()? {
                let days: Vec<String> = rule.days_of_week.iter().map(u8::to_string).collect();
                println!(
                    "{:>5}  ch {:<6} [{}] {}-{}  {}{}",
                    rule.id,
                    rule.channel_id,
                    days.join(","),
                    rule.start_time,
                    rule.end_time,
                    rule.name,
                    if rule.enabled { "" } else { " (disabled)" }
                );
            }
        }
        DvrSubcommands::AddRecurringRule(args) => {
            let rule = RecurringRule {
                channel_id: args.channel,
                days_of_week: args.days.into_iter().collect(),
                start_time: args.start_time,
                end_time: args.end_time,
                start_date: args.start_date,
                end_date: args.end_date,
                name: args.name,
                enabled: !args.disabled,
                ..RecurringRule::default()
            };
            client.add_recurring_rule(&rule)?;
            println!("Added recurring rule on channel {}", rule.channel_id);
        }
        DvrSubcommands::DeleteRecurringRule { id } => {
            client.delete_recurring_rule(id)?;
            println!("Deleted recurring rule {}", id);
        }
        DvrSubcommands::Recordings => {
            for rec in client.list_recordings()? {
                println!(
                    "{:>5}  ch {:<6} {}  {}",
                    rec.id,
                    rec.channel_id,
                    format_datetime(rec.start_time),
                    rec.title
                );
            }
        }
        DvrSubcommands::DeleteRecording { id } => {
            client.delete_recording(id)?;
            println!("Deleted recording {}", id);
        }
        DvrSubcommands::Schedule {
            channel,
            start,
            end,
            title,
        } => {
            let (start_ts, end_ts) = (parse_iso_time(&start), parse_iso_time(&end));
            if start_ts == 0 || end_ts <= start_ts {
                return Err(format!("invalid time range {} .. {}", start, end).into());
            }
            client.schedule_recording(channel, start_ts, end_ts, &title)?;
            println!("Scheduled {} on channel {}", title, channel);
        }
    }
    Ok(())
}
