// Melodeon - scrape, search, and play streaming audio from the terminal
// Playback goes through an external decoder in remote-control mode;
// everything here is catalog lookup and command dispatch around it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use melodeon::scrape::{self, SiteClient};
use melodeon::{
    Catalog, Config, DecoderSettings, PlaybackSession, PlaybackState, TrackRecord, Translator,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "melodeon")]
#[command(about = "Catalogs streaming audio tracks and plays them through an external decoder")]
struct Args {
    /// Enable developer logging (stderr + debug output)
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the catalog and play the chosen track
    Play {
        terms: Vec<String>,
        /// Also save the stream to this file after playback
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// List catalog tracks matching the terms
    Search { terms: Vec<String> },
    /// Harvest the remote site into the catalog
    Scrape {
        /// Concurrent downloads (defaults to the configured value)
        #[arg(long)]
        threads: Option<usize>,
        /// Drop previously scraped tracks first
        #[arg(long)]
        rescrape: bool,
        /// Harvest a single series by (approximate) name
        #[arg(long)]
        series: Option<String>,
    },
    /// Search the remote site without touching the catalog
    Discover { keywords: Vec<String> },
    /// Download a track's stream without playing it
    Save {
        terms: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(dev: bool) -> Result<()> {
    let log_dir = Config::log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "melodeon.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Base filter: info level for general logs, debug for melodeon
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,melodeon=debug"));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(base_filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if dev {
        eprintln!("dev mode: logging to {}", log_dir.display());
    }

    // Keep the appender alive for the program's lifetime
    std::mem::forget(guard);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.dev)?;

    let config = Config::load()?;
    let mut catalog = Catalog::open(&config.database_path)
        .with_context(|| format!("opening catalog {}", config.database_path.display()))?;

    match args.command {
        Command::Play { terms, save } => {
            let Some(track) = pick_track(&catalog, &terms, config.ui.max_results)? else {
                return Ok(());
            };
            play_track(&config, &catalog, &track).await?;

            if let Some(dest) = save {
                let client = site_client(&config)?;
                client.download(&track.url, &dest).await?;
                println!("Saved to {}", dest.display());
            }
        }

        Command::Search { terms } => {
            let tracks = catalog.search(&terms)?;
            if tracks.is_empty() {
                println!("No matches.");
            } else {
                print_tracks(&catalog, &tracks, config.ui.max_results)?;
            }
        }

        Command::Scrape {
            threads,
            rescrape,
            series,
        } => {
            let client = site_client(&config)?;
            let translator = Translator::new()?;
            let threads = threads.unwrap_or(config.scrape.threads);

            let summary = match series {
                Some(name) => {
                    scrape::harvest_one(&client, &translator, &mut catalog, &name).await?
                }
                None => {
                    println!(
                        "Using {} thread{} to download links",
                        threads,
                        if threads == 1 { "" } else { "s" }
                    );
                    scrape::harvest(&client, &translator, &mut catalog, threads, rescrape).await?
                }
            };
            println!(
                "Added {} series / {} tracks ({} series failed)",
                summary.series, summary.tracks, summary.failures
            );
        }

        Command::Discover { keywords } => {
            let client = site_client(&config)?;
            let hits = client.search(&keywords.join(" ")).await?;
            if hits.is_empty() {
                println!("Nothing found on the remote site.");
            }
            for hit in hits {
                println!("{:>4}  {}  ({})", hit.series_number, hit.default_title, hit.series);
            }
        }

        Command::Save { terms, output } => {
            let Some(track) = pick_track(&catalog, &terms, config.ui.max_results)? else {
                return Ok(());
            };
            let dest = output.unwrap_or_else(|| PathBuf::from(url_basename(&track.url)));
            println!("Downloading from {}", track.url);
            let client = site_client(&config)?;
            client.download(&track.url, &dest).await?;
            println!("Saved to {}", dest.display());
        }
    }

    Ok(())
}

fn site_client(config: &Config) -> Result<SiteClient> {
    SiteClient::new(Duration::from_millis(config.scrape.request_delay_ms))
}

/// Run one playback session for the track and report how it went.
async fn play_track(config: &Config, catalog: &Catalog, track: &TrackRecord) -> Result<()> {
    let series = catalog.series_for(track)?;
    println!("{}", track.describe(series.as_ref()));

    let mut session = PlaybackSession::new(DecoderSettings::from(config));
    let outcome = session.play(catalog, track).await?;
    info!(
        "playback of '{}' ended: {:?} at {:.1}s",
        track.display_title(),
        outcome.state,
        outcome.elapsed
    );

    if outcome.state == PlaybackState::Failed {
        eprintln!("Decoder died at {:.1}s", outcome.elapsed);
    }
    Ok(())
}

/// Search the catalog and let the user pick one match. Enter takes the
/// first, `q` aborts; at most `max_results` choices are offered.
fn pick_track(catalog: &Catalog, terms: &[String], max_results: usize) -> Result<Option<TrackRecord>> {
    let tracks = catalog.search(terms)?;
    if tracks.is_empty() {
        println!("No matches.");
        return Ok(None);
    }
    if tracks.len() == 1 {
        return Ok(Some(tracks[0].clone()));
    }

    print_tracks(catalog, &tracks, max_results)?;
    print!("Enter number (Enter for first, q to quit): ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let input = input.trim();

    let choice = if input.is_empty() {
        Some(0)
    } else if input == "q" {
        None
    } else {
        input
            .parse::<usize>()
            .ok()
            .filter(|&i| i < tracks.len().min(max_results))
    };

    Ok(choice.map(|i| tracks[i].clone()))
}

/// Print a numbered track listing, titles padded to a shared width and the
/// series name appended.
fn print_tracks(catalog: &Catalog, tracks: &[TrackRecord], max_results: usize) -> Result<()> {
    let shown = &tracks[..tracks.len().min(max_results)];
    let width = shown
        .iter()
        .map(|t| t.display_title().chars().count())
        .max()
        .unwrap_or(0);

    for (i, track) in shown.iter().enumerate() {
        let series = catalog.series_for(track)?;
        let series_name = series.as_ref().map(|s| s.display_name()).unwrap_or("");
        let title = track.display_title();
        let padding = width.saturating_sub(title.chars().count());
        println!("{:>2} {}{} {}", i, title, " ".repeat(padding), series_name);
    }
    if tracks.len() > shown.len() {
        println!("   ... and {} more", tracks.len() - shown.len());
    }
    Ok(())
}

fn url_basename(url: &str) -> String {
    url.rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or("track.mp3")
        .to_string()
}
