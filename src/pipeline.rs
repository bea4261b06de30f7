//! Ingestion driver.
//!
//! Chart dates are handled one at a time, oldest first: read the date's
//! files, assemble new records, commit. The ledger is rebuilt from the
//! staging store at the start of every run, which is what makes a rerun
//! after a crash (or over the same input) safe.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::assembler::BatchAssembler;
use crate::catalog::CatalogClient;
use crate::chart_files::{self, ChartDate};
use crate::config::{FailurePolicy, IngestConfig};
use crate::ledger::Ledger;
use crate::models::{Batches, ChartInstance, ChartRow};
use crate::progress::{create_progress_bar, log_progress};
use crate::resolver::Resolver;
use crate::staging::StagingStore;

// ============================================================================
// Statistics
// ============================================================================

/// Counters for one ingestion run.
#[derive(Default, Debug, Clone, Serialize)]
pub struct IngestStats {
    // Discovery
    pub dates_found: usize,
    pub dates_already_processed: usize,
    pub files_skipped: usize,

    // Per-date outcome
    pub dates_committed: usize,
    pub dates_deferred: usize,

    // Rows
    pub rows_read: usize,
    pub blank_rows: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub lookup_failures: usize,
    pub duplicate_entries: usize,

    // New records
    pub new_chart_instances: usize,
    pub new_tracks: usize,
    pub new_artists: usize,
    pub new_artist_tracks: usize,
    pub new_chart_entries: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl IngestStats {
    fn absorb(&mut self, batches: &Batches) {
        let o = &batches.outcome;
        self.rows_read += o.rows;
        self.blank_rows += o.blank_rows;
        self.resolved += o.resolved;
        self.unresolved += o.unresolved;
        self.lookup_failures += o.lookup_failures;
        self.duplicate_entries += o.duplicate_entries;

        self.new_chart_instances += usize::from(batches.chart_instance.is_some());
        self.new_tracks += batches.tracks.len();
        self.new_artists += batches.artists.len();
        self.new_artist_tracks += batches.artist_tracks.len();
        self.new_chart_entries += batches.chart_entries.len();
    }

    /// Share of looked-up rows that resolved, as a percentage
    pub fn resolve_rate(&self) -> f64 {
        let attempted = self.resolved + self.unresolved + self.lookup_failures;
        if attempted == 0 {
            0.0
        } else {
            100.0 * self.resolved as f64 / attempted as f64
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write stats to {:?}", path))?;
        Ok(())
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Ingest every unprocessed chart date found in `input_dir`.
pub fn run_ingest<C: CatalogClient>(
    input_dir: &Path,
    store: &mut StagingStore,
    catalog: C,
    config: &IngestConfig,
) -> Result<IngestStats> {
    let start = Instant::now();
    let mut stats = IngestStats::default();

    let discovery = chart_files::discover(input_dir)
        .with_context(|| format!("Failed to scan input directory {:?}", input_dir))?;
    for skipped in &discovery.skipped {
        warn!(file = %skipped.path.display(), reason = %skipped.reason, "Skipping input file");
    }
    stats.files_skipped += discovery.skipped.len();
    stats.dates_found = discovery.dates.len();

    let mut ledger = Ledger::load_from(store)?;
    info!(known_keys = ledger.len(), "Ledger rebuilt from staging store");

    let resolver = Resolver::new(catalog);
    let assembler = BatchAssembler::new(&resolver, config);

    for chart_date in &discovery.dates {
        let id = chart_date.id();
        if store.is_processed(&id)? {
            stats.dates_already_processed += 1;
            info!(chart_date = %id, "Already processed, skipping");
            continue;
        }

        let (rows, unreadable_files) = read_date_rows(chart_date);
        stats.files_skipped += unreadable_files;
        let pb = create_progress_bar(rows.len() as u64, &format!("Chart {}", id));
        let assembly = assembler.assemble(
            &rows,
            &ChartInstance::new(chart_date.date),
            &mut ledger,
            &pb,
        );
        pb.finish_and_clear();

        let batches = assembly.batches;
        let failures = batches.outcome.lookup_failures;

        let lookups_settled = match (failures, config.failure_policy) {
            (0, _) | (_, FailurePolicy::Accept) => true,
            (_, FailurePolicy::Defer) => false,
            (_, FailurePolicy::Abort) => bail!(
                "{} catalog lookups failed for chart date {} (first: {})",
                failures,
                id,
                assembly
                    .failures
                    .first()
                    .map(|f| format!("#{} {} - {}: {}", f.position, f.artist, f.track, f.error))
                    .unwrap_or_default()
            ),
        };
        // An unreadable file keeps the date open until it can be read.
        let mark_processed = lookups_settled && unreadable_files == 0;

        store
            .commit(&id, &batches, mark_processed)
            .with_context(|| format!("Commit failed for chart date {}", id))?;

        stats.absorb(&batches);
        if mark_processed {
            stats.dates_committed += 1;
        } else {
            stats.dates_deferred += 1;
            warn!(
                chart_date = %id,
                failures,
                unreadable_files,
                "Date left unprocessed for the next run"
            );
        }

        let o = &batches.outcome;
        info!(
            chart_date = %id,
            rows = o.rows,
            resolved = o.resolved,
            unresolved = o.unresolved,
            failures = o.lookup_failures,
            new_records = batches.record_count(),
            "Committed chart date"
        );
        let done = stats.dates_committed + stats.dates_deferred + stats.dates_already_processed;
        log_progress("dates", done as u64, stats.dates_found as u64, 10);
    }

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    Ok(stats)
}

/// Concatenate the rows of every readable file for a date.
/// Malformed files are reported and skipped; the count of skipped files is
/// returned alongside the rows.
fn read_date_rows(chart_date: &ChartDate) -> (Vec<ChartRow>, usize) {
    let mut rows = Vec::new();
    let mut unreadable = 0;
    for path in &chart_date.files {
        match chart_files::read_rows(path) {
            Ok(file_rows) => rows.extend(file_rows),
            Err(reason) => {
                unreadable += 1;
                warn!(file = %path.display(), %reason, "Skipping malformed chart file");
            }
        }
    }
    (rows, unreadable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::FakeCatalog;
    use crate::models::{Artist, ArtistTrack, ChartEntry, EntityKind, Track};
    use std::fs;
    use std::path::PathBuf;

    fn write_chart(dir: &Path, date: &str, body: &str) -> PathBuf {
        let path = dir.join(format!("hot100_{}.csv", date));
        fs::write(&path, body).unwrap();
        path
    }

    fn ingest(dir: &Path, store: &mut StagingStore, catalog: impl CatalogClient) -> IngestStats {
        run_ingest(dir, store, catalog, &IngestConfig::unthrottled()).unwrap()
    }

    fn catalog() -> FakeCatalog {
        FakeCatalog::new()
            .hit("Song A", "Drake", "ISRCA", &[("drake", "Drake"), ("rihanna", "Rihanna")])
            .hit("Song B", "Adele", "ISRCB", &[("adele", "Adele")])
            .hit("Song C", "Future", "ISRCC", &[("future", "Future")])
    }

    /// Every collection's contents, for whole-store comparisons.
    #[derive(Debug, PartialEq)]
    struct Snapshot {
        instances: Vec<ChartInstance>,
        tracks: Vec<Track>,
        artists: Vec<Artist>,
        artist_tracks: Vec<ArtistTrack>,
        entries: Vec<ChartEntry>,
    }

    fn snapshot(store: &StagingStore) -> Snapshot {
        Snapshot {
            instances: store.read_all().unwrap(),
            tracks: store.read_all().unwrap(),
            artists: store.read_all().unwrap(),
            artist_tracks: store.read_all().unwrap(),
            entries: store.read_all().unwrap(),
        }
    }

    const JAN_04: &str =
        "track,artist,position\nSong A,Drake Featuring Rihanna,1\nSong B,Adele,2\n";
    const JAN_11: &str = "track,artist,position\nSong B,Adele,1\nSong A,Drake,2\n";
    const JAN_18: &str = "track,artist,position\nSong C,Future,1\nSong A,Drake with Future,2\n";

    #[test]
    fn test_composite_key_dedup_across_dates() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", "track,artist\nSong A,Drake\n");
        write_chart(dir.path(), "2020-01-11", "track,artist\nSong A,Drake\n");

        let catalog = catalog();
        let mut store = StagingStore::open_in_memory().unwrap();
        let stats = ingest(dir.path(), &mut store, &catalog);

        assert_eq!(catalog.call_count(), 2);
        assert_eq!(store.count(EntityKind::Track).unwrap(), 1);
        assert_eq!(store.count(EntityKind::Artist).unwrap(), 2);
        assert_eq!(store.count(EntityKind::ArtistTrack).unwrap(), 2);
        assert_eq!(store.count(EntityKind::ChartEntry).unwrap(), 2);
        assert_eq!(store.count(EntityKind::ChartInstance).unwrap(), 2);
        assert_eq!(stats.dates_committed, 2);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", JAN_04);
        write_chart(dir.path(), "2020-01-11", JAN_11);

        let catalog = catalog();
        let mut store = StagingStore::open_in_memory().unwrap();
        ingest(dir.path(), &mut store, &catalog);
        let first = snapshot(&store);
        let calls_after_first = catalog.call_count();

        let stats = ingest(dir.path(), &mut store, &catalog);
        assert_eq!(snapshot(&store), first);
        assert_eq!(stats.dates_already_processed, 2);
        assert_eq!(catalog.call_count(), calls_after_first);
    }

    #[test]
    fn test_resume_after_crash_matches_uninterrupted_run() {
        // Uninterrupted reference run over all three dates.
        let full_dir = tempfile::tempdir().unwrap();
        write_chart(full_dir.path(), "2020-01-04", JAN_04);
        write_chart(full_dir.path(), "2020-01-11", JAN_11);
        write_chart(full_dir.path(), "2020-01-18", JAN_18);
        let mut reference = StagingStore::open_in_memory().unwrap();
        ingest(full_dir.path(), &mut reference, catalog());

        // Crashed run: only the first two dates reached the store.
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", JAN_04);
        write_chart(dir.path(), "2020-01-11", JAN_11);
        let mut store = StagingStore::open_in_memory().unwrap();
        ingest(dir.path(), &mut store, catalog());

        // Restart with the remaining date present.
        write_chart(dir.path(), "2020-01-18", JAN_18);
        let resumed = catalog();
        let stats = ingest(dir.path(), &mut store, &resumed);

        assert_eq!(stats.dates_already_processed, 2);
        assert_eq!(stats.dates_committed, 1);
        // Only the 2020-01-18 rows were looked up again.
        assert_eq!(resumed.call_count(), 2);
        assert_eq!(snapshot(&store), snapshot(&reference));
    }

    #[test]
    fn test_deferred_date_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", JAN_04);

        let mut store = StagingStore::open_in_memory().unwrap();
        let flaky = catalog().flaky("Song B", "Adele", 1);
        let stats = ingest(dir.path(), &mut store, &flaky);
        assert_eq!(stats.dates_deferred, 1);
        assert!(!store.is_processed("2020-01-04").unwrap());
        assert_eq!(store.count(EntityKind::ChartEntry).unwrap(), 1);

        // Second run: the failed row now resolves, nothing is duplicated.
        let stats = ingest(dir.path(), &mut store, &flaky);
        assert_eq!(stats.dates_committed, 1);
        assert_eq!(stats.new_chart_instances, 0);
        assert_eq!(stats.new_chart_entries, 1);
        assert!(store.is_processed("2020-01-04").unwrap());
        assert_eq!(store.count(EntityKind::ChartEntry).unwrap(), 2);
        assert_eq!(store.count(EntityKind::Track).unwrap(), 2);
    }

    #[test]
    fn test_accept_policy_marks_processed() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", JAN_04);

        let mut store = StagingStore::open_in_memory().unwrap();
        let config = IngestConfig {
            failure_policy: FailurePolicy::Accept,
            ..IngestConfig::unthrottled()
        };
        let failing = catalog().failing("Song B", "Adele");
        let stats = run_ingest(dir.path(), &mut store, failing, &config).unwrap();
        assert_eq!(stats.lookup_failures, 1);
        assert_eq!(stats.dates_committed, 1);
        assert!(store.is_processed("2020-01-04").unwrap());
    }

    #[test]
    fn test_abort_policy_commits_nothing_for_date() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", "track,artist\nSong A,Drake\n");
        write_chart(dir.path(), "2020-01-11", JAN_11);

        let mut store = StagingStore::open_in_memory().unwrap();
        let config = IngestConfig {
            failure_policy: FailurePolicy::Abort,
            ..IngestConfig::unthrottled()
        };
        let err = run_ingest(dir.path(), &mut store, catalog().failing("Song B", "Adele"), &config)
            .unwrap_err();
        assert!(err.to_string().contains("2020-01-11"));

        assert!(store.is_processed("2020-01-04").unwrap());
        assert!(!store.is_processed("2020-01-11").unwrap());
        assert_eq!(store.count(EntityKind::ChartInstance).unwrap(), 1);
    }

    #[test]
    fn test_malformed_files_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", "song,singer\nSong A,Drake\n");
        write_chart(dir.path(), "2020-01-11", JAN_11);
        fs::write(dir.path().join("hot100_latest.csv"), JAN_04).unwrap();

        let mut store = StagingStore::open_in_memory().unwrap();
        let stats = ingest(dir.path(), &mut store, catalog());
        assert_eq!(stats.files_skipped, 2);
        assert_eq!(stats.dates_found, 2);
        assert_eq!(stats.dates_committed, 1);
        assert_eq!(stats.dates_deferred, 1);
        // The date with no readable file still gets its chart instance, but stays open.
        assert_eq!(store.count(EntityKind::ChartInstance).unwrap(), 2);
        assert_eq!(store.count(EntityKind::ChartEntry).unwrap(), 2);
        assert!(!store.is_processed("2020-01-04").unwrap());
        assert!(store.is_processed("2020-01-11").unwrap());
    }

    #[test]
    fn test_repaired_file_is_ingested_on_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_chart(dir.path(), "2020-01-04", "song,singer\nSong A,Drake\n");

        let mut store = StagingStore::open_in_memory().unwrap();
        let stats = ingest(dir.path(), &mut store, catalog());
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.dates_deferred, 1);
        assert!(!store.is_processed("2020-01-04").unwrap());

        fs::write(&path, "track,artist\nSong A,Drake\n").unwrap();
        let repaired = catalog();
        let stats = ingest(dir.path(), &mut store, &repaired);
        assert_eq!(stats.dates_already_processed, 0);
        assert_eq!(stats.dates_committed, 1);
        assert_eq!(repaired.call_count(), 1);
        assert_eq!(store.count(EntityKind::ChartEntry).unwrap(), 1);
        assert_eq!(store.count(EntityKind::ChartInstance).unwrap(), 1);
        assert!(store.is_processed("2020-01-04").unwrap());
    }

    #[test]
    fn test_half_readable_date_keeps_remaining_file_pending() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", "track,artist\nSong A,Drake\n");
        let bad = dir.path().join("extra_2020-01-04.csv");
        fs::write(&bad, "track,artist,position\nSong B,Adele,first\n").unwrap();

        let mut store = StagingStore::open_in_memory().unwrap();
        ingest(dir.path(), &mut store, catalog());
        assert_eq!(store.count(EntityKind::ChartEntry).unwrap(), 1);
        assert!(!store.is_processed("2020-01-04").unwrap());

        fs::write(&bad, "track,artist,position\nSong B,Adele,2\n").unwrap();
        ingest(dir.path(), &mut store, catalog());
        assert_eq!(store.count(EntityKind::ChartEntry).unwrap(), 2);
        assert_eq!(store.count(EntityKind::Track).unwrap(), 2);
        assert!(store.is_processed("2020-01-04").unwrap());
    }

    #[test]
    fn test_every_reference_has_a_track() {
        let dir = tempfile::tempdir().unwrap();
        write_chart(dir.path(), "2020-01-04", JAN_04);
        write_chart(dir.path(), "2020-01-11", JAN_11);
        write_chart(dir.path(), "2020-01-18", JAN_18);

        let mut store = StagingStore::open_in_memory().unwrap();
        ingest(dir.path(), &mut store, catalog());
        let snap = snapshot(&store);
        let isrcs: Vec<&str> = snap.tracks.iter().map(|t| t.id.as_str()).collect();
        assert!(snap.artist_tracks.iter().all(|at| isrcs.contains(&at.track_isrc.as_str())));
        assert!(snap.entries.iter().all(|e| isrcs.contains(&e.track_isrc.as_str())));
    }
}
