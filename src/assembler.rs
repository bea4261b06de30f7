//! Batch assembly: one chart date's rows in, new records out.
//!
//! Rows are processed strictly in input order. That order fixes synthesized
//! positions upstream and decides ties here: the first row to chart a given
//! ISRC on a date wins, later rows for the same (date, ISRC) are dropped.

use indicatif::ProgressBar;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::catalog::{CatalogClient, LookupError};
use crate::config::IngestConfig;
use crate::ledger::Ledger;
use crate::models::{
    Artist, ArtistTrack, Batches, ChartEntry, ChartInstance, ChartRow, NaturalKey, Track,
};
use crate::resolver::{Resolution, ResolvedTrack, Resolver};

/// A row skipped because its lookup failed, kept for the run report.
#[derive(Debug)]
pub struct RowFailure {
    pub position: u32,
    pub track: String,
    pub artist: String,
    pub error: LookupError,
}

/// Assembled output for one chart date.
#[derive(Debug, Default)]
pub struct Assembly {
    pub batches: Batches,
    pub failures: Vec<RowFailure>,
}

pub struct BatchAssembler<'a, C> {
    resolver: &'a Resolver<C>,
    config: &'a IngestConfig,
}

impl<'a, C: CatalogClient> BatchAssembler<'a, C> {
    pub fn new(resolver: &'a Resolver<C>, config: &'a IngestConfig) -> Self {
        Self { resolver, config }
    }

    /// Resolve every row and collect the records the ledger has not seen yet.
    /// Each new key is recorded immediately, so later rows (and later dates)
    /// treat it as known.
    pub fn assemble(
        &self,
        rows: &[ChartRow],
        chart_instance: &ChartInstance,
        ledger: &mut Ledger,
        progress: &ProgressBar,
    ) -> Assembly {
        let mut assembly = Assembly::default();
        let batches = &mut assembly.batches;

        if ledger.record(NaturalKey::ChartInstance(chart_instance.id.clone())) {
            batches.chart_instance = Some(chart_instance.clone());
        }

        for row in rows {
            progress.inc(1);
            batches.outcome.rows += 1;

            if row.track.trim().is_empty() || row.artist.trim().is_empty() {
                batches.outcome.blank_rows += 1;
                debug!(position = row.position, "Skipping row with blank track or artist");
                continue;
            }

            match self.lookup(row) {
                Resolution::Resolved(resolved) => {
                    batches.outcome.resolved += 1;
                    emit(batches, ledger, &chart_instance.id, row.position, resolved);
                }
                Resolution::Unresolved => {
                    batches.outcome.unresolved += 1;
                    debug!(track = %row.track, artist = %row.artist, "No catalog match");
                }
                Resolution::LookupFailed(error) => {
                    batches.outcome.lookup_failures += 1;
                    warn!(
                        chart_date = %chart_instance.id,
                        position = row.position,
                        track = %row.track,
                        artist = %row.artist,
                        %error,
                        "Catalog lookup failed"
                    );
                    assembly.failures.push(RowFailure {
                        position: row.position,
                        track: row.track.clone(),
                        artist: row.artist.clone(),
                        error,
                    });
                }
            }
        }

        assembly
    }

    /// Resolve one row, retrying transient failures up to the configured count.
    /// The rate-limit pause follows every attempt.
    fn lookup(&self, row: &ChartRow) -> Resolution {
        let mut attempt = 0;
        loop {
            let resolution = self.resolver.resolve(&row.track, &row.artist);
            let hint = match &resolution {
                Resolution::LookupFailed(err) => err.retry_after(),
                _ => None,
            };
            self.pause(hint);

            match resolution {
                Resolution::LookupFailed(err) if attempt < self.config.lookup_retries => {
                    attempt += 1;
                    debug!(attempt, %err, track = %row.track, "Retrying lookup");
                }
                other => return other,
            }
        }
    }

    fn pause(&self, retry_after: Option<Duration>) {
        let delay = self
            .config
            .rate_limit_delay
            .max(retry_after.unwrap_or(Duration::ZERO));
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Append whatever part of a resolved row is new to the batches.
fn emit(
    batches: &mut Batches,
    ledger: &mut Ledger,
    chart_instance_id: &str,
    position: u32,
    resolved: ResolvedTrack,
) {
    let isrc = resolved.isrc;

    if ledger.record(NaturalKey::Track(isrc.clone())) {
        batches.tracks.push(Track {
            id: isrc.clone(),
            spotify_track_id: resolved.canonical_track_id,
            name: resolved.canonical_track_name,
            album: None,
            release_date: None,
        });
    }

    for artist in resolved.artists {
        if ledger.record(NaturalKey::artist_track(&artist.id, &isrc)) {
            batches.artist_tracks.push(ArtistTrack {
                artist_id: artist.id.clone(),
                track_isrc: isrc.clone(),
            });
        }
        if ledger.record(NaturalKey::Artist(artist.id.clone())) {
            batches.artists.push(Artist::new(artist.id, artist.name));
        }
    }

    if ledger.record(NaturalKey::chart_entry(chart_instance_id, &isrc)) {
        batches.chart_entries.push(ChartEntry {
            chart_instance_id: chart_instance_id.to_string(),
            track_isrc: isrc,
            position,
        });
    } else {
        batches.outcome.duplicate_entries += 1;
    }
}
