use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use chart_ingest::catalog::CatalogClient;
use chart_ingest::config::{FailurePolicy, IngestConfig, DEFAULT_RATE_LIMIT_DELAY};
use chart_ingest::export::export_all;
use chart_ingest::loader::UpsertLoader;
use chart_ingest::models::EntityKind;
use chart_ingest::pipeline::run_ingest;
use chart_ingest::progress::{create_spinner, format_duration, set_log_only};
use chart_ingest::resolver::{Resolution, Resolver};
use chart_ingest::safety::{validate_export_dir, validate_target_database};
use chart_ingest::spotify::SpotifyClient;
use chart_ingest::staging::StagingStore;

#[derive(Parser, Debug)]
#[command(name = "chart-ingest")]
#[command(about = "Incrementally resolve chart snapshots into a deduplicated track/artist graph")]
struct Cli {
    /// Disable progress bars, emit periodic log lines instead (for tail -f)
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve and stage every unprocessed chart date in a directory
    Ingest(IngestArgs),

    /// Upsert the staged collections into a relational database
    Load(LoadArgs),

    /// Write the staged collections as CSV files
    Export(ExportArgs),

    /// Resolve a single (track, artist) pair and print the result
    Resolve(ResolveArgs),

    /// Show processed dates and collection sizes of a staging store
    Status(StatusArgs),
}

#[derive(Parser, Debug, Clone)]
struct CatalogArgs {
    #[arg(long, env = "SPOTIPY_CLIENT_ID", hide_env_values = true)]
    client_id: String,

    #[arg(long, env = "SPOTIPY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,
}

#[derive(Parser, Debug)]
struct IngestArgs {
    /// Directory of per-date chart CSVs (name ends in YYYY-MM-DD)
    #[arg(long)]
    input: PathBuf,

    /// Staging SQLite database (created if missing)
    #[arg(long)]
    staging: PathBuf,

    /// Pause after every catalog lookup, in milliseconds
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT_DELAY.as_millis() as u64)]
    rate_limit_ms: u64,

    /// Extra attempts for a row whose lookup failed
    #[arg(long, default_value_t = 0)]
    lookup_retries: u32,

    /// What to do with a date that had lookup failures
    #[arg(long, value_enum, default_value_t = FailurePolicy::Defer)]
    on_lookup_failure: FailurePolicy,

    /// Write run statistics to this JSON file
    #[arg(long)]
    stats: Option<PathBuf>,

    #[command(flatten)]
    catalog: CatalogArgs,
}

#[derive(Parser, Debug)]
struct LoadArgs {
    #[arg(long)]
    staging: PathBuf,

    /// Relational SQLite database to upsert into
    #[arg(long)]
    database: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    #[arg(long)]
    staging: PathBuf,

    /// Output directory for the CSV files
    #[arg(long)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct ResolveArgs {
    track: String,

    artist: String,

    /// Also fetch genres and followers of each credited artist
    #[arg(long)]
    profiles: bool,

    #[command(flatten)]
    catalog: CatalogArgs,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    #[arg(long)]
    staging: PathBuf,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    set_log_only(cli.log_only);

    match cli.cmd {
        Command::Ingest(args) => cmd_ingest(args),
        Command::Load(args) => cmd_load(args),
        Command::Export(args) => cmd_export(args),
        Command::Resolve(args) => cmd_resolve(args),
        Command::Status(args) => cmd_status(args),
    }
}

fn cmd_ingest(args: IngestArgs) -> Result<()> {
    let config = IngestConfig {
        rate_limit_delay: Duration::from_millis(args.rate_limit_ms),
        lookup_retries: args.lookup_retries,
        failure_policy: args.on_lookup_failure,
    };

    println!("Opening staging store: {:?}", args.staging);
    let mut store = StagingStore::open(&args.staging)?;
    let catalog = SpotifyClient::new(&args.catalog.client_id, &args.catalog.client_secret)?;

    let stats = run_ingest(&args.input, &mut store, catalog, &config)?;

    println!("\n{:=<60}", "");
    println!("Ingestion complete!");
    println!(
        "  Dates: {} found, {} committed, {} deferred, {} already processed",
        stats.dates_found,
        stats.dates_committed,
        stats.dates_deferred,
        stats.dates_already_processed
    );
    println!("  Files skipped: {}", stats.files_skipped);
    println!(
        "  Rows: {} read, {} blank, {} duplicate entries",
        stats.rows_read, stats.blank_rows, stats.duplicate_entries
    );
    println!(
        "  Resolved: {} ({:.1}%), unresolved: {}, lookup failures: {}",
        stats.resolved,
        stats.resolve_rate(),
        stats.unresolved,
        stats.lookup_failures
    );
    println!(
        "  New records: {} chart instances, {} tracks, {} artists, {} artist-tracks, {} entries",
        stats.new_chart_instances,
        stats.new_tracks,
        stats.new_artists,
        stats.new_artist_tracks,
        stats.new_chart_entries
    );
    println!("  Elapsed: {}", format_duration(Duration::from_secs_f64(stats.elapsed_seconds)));
    println!("{:=<60}", "");

    if let Some(path) = args.stats {
        stats.write_to_file(&path)?;
        println!("Stats written to {:?}", path);
    }

    Ok(())
}

fn cmd_load(args: LoadArgs) -> Result<()> {
    validate_target_database(&args.database, &args.staging)?;
    let start = Instant::now();

    let staging = StagingStore::open(&args.staging)?;
    println!("Loading into: {:?}", args.database);
    let mut loader = UpsertLoader::open(&args.database)?;

    let spinner = create_spinner("Upserting collections");
    let results = loader.load_all(&staging);
    spinner.finish_and_clear();

    println!("\n{:=<60}", "");
    println!("Load complete!");
    let mut failed = Vec::new();
    for (kind, result) in &results {
        match result {
            Ok(r) => println!(
                "  {:<16} {:>8} attempted, {:>8} inserted, {:>8} updated, {:>8} ignored",
                kind.table(),
                r.attempted,
                r.inserted,
                r.updated,
                r.ignored
            ),
            Err(e) => {
                println!("  {:<16} FAILED: {:#}", kind.table(), e);
                failed.push(*kind);
            }
        }
    }
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(|k| k.table()).collect();
        bail!("{} entity kind(s) failed to load: {}", failed.len(), names.join(", "));
    }
    Ok(())
}

fn cmd_export(args: ExportArgs) -> Result<()> {
    validate_export_dir(&args.output, &args.staging)?;
    let staging = StagingStore::open(&args.staging)?;
    let written = export_all(&staging, &args.output)?;

    println!("\n{:=<60}", "");
    println!("Export complete!");
    for (path, rows) in &written {
        println!("  {:>8} rows -> {}", rows, path.display());
    }
    println!("{:=<60}", "");
    Ok(())
}

fn cmd_resolve(args: ResolveArgs) -> Result<()> {
    let catalog = SpotifyClient::new(&args.catalog.client_id, &args.catalog.client_secret)?;
    let resolver = Resolver::new(catalog);

    match resolver.resolve(&args.track, &args.artist) {
        Resolution::Resolved(track) => {
            println!("Resolved: {} ({})", track.canonical_track_name, track.isrc);
            println!("  Catalog track id: {}", track.canonical_track_id);
            for artist in &track.artists {
                println!("  Artist: {} [{}]", artist.name, artist.id);
                if args.profiles {
                    match resolver.catalog().artist_profile(&artist.id) {
                        Ok(Some(p)) => println!(
                            "    genres: {:?}, followers: {}",
                            p.genres,
                            p.followers.map_or("-".to_string(), |f| f.to_string())
                        ),
                        Ok(None) => println!("    (no profile)"),
                        Err(e) => println!("    profile lookup failed: {}", e),
                    }
                }
            }
        }
        Resolution::Unresolved => println!("Unresolved: no usable catalog match"),
        Resolution::LookupFailed(e) => bail!("Lookup failed: {}", e),
    }
    Ok(())
}

fn cmd_status(args: StatusArgs) -> Result<()> {
    let staging = StagingStore::open(&args.staging)?;
    let dates = staging.processed_dates()?;

    println!("Staging store: {:?}", args.staging);
    match (dates.first(), dates.last()) {
        (Some(first), Some(last)) => {
            println!("  Processed dates: {} ({} .. {})", dates.len(), first, last)
        }
        _ => println!("  Processed dates: 0"),
    }
    for kind in EntityKind::LOAD_ORDER {
        println!("  {:<16} {:>8}", kind.table(), staging.count(kind)?);
    }
    Ok(())
}
