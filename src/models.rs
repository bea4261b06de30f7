//! Core data models for chart ingestion.
//!
//! This module contains the normalized entity records emitted by the
//! pipeline, the raw chart row read from input files, and the natural-key
//! vocabulary shared by the ledger, the staging store and the loader.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

// ============================================================================
// Input Models
// ============================================================================

/// One raw row of a chart-date file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartRow {
    pub track: String,
    pub artist: String,
    /// Stated rank, or the 1-based row index when the file has no position column.
    pub position: u32,
}

// ============================================================================
// Entity Models
// ============================================================================

/// One dated chart snapshot. `id == date.to_string()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartInstance {
    pub id: String,
    pub date: NaiveDate,
}

impl ChartInstance {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: chart_instance_id(date),
            date,
        }
    }
}

/// Canonical chart instance id for a date (ISO `YYYY-MM-DD`).
pub fn chart_instance_id(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// A recording, keyed by ISRC.
/// `album` and `release_date` are filled by later enrichment passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub spotify_track_id: String,
    pub name: String,
    pub album: Option<String>,
    pub release_date: Option<NaiveDate>,
}

/// A credited artist, keyed by catalog artist id.
/// Everything past `name` is owned by enrichment; ingestion leaves it empty.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub genres: Option<Vec<String>>,
    pub followers: Option<i64>,
    pub musicbrainz_id: Option<String>,
    pub artist_type: Option<String>,
    pub country_of_origin: Option<String>,
    pub year_of_origin: Option<String>,
    pub disambiguation: Option<String>,
    pub needs_review: bool,
}

impl Artist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Join record between an artist and a track it is credited on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtistTrack {
    pub artist_id: String,
    pub track_isrc: String,
}

/// A track's rank on one chart date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartEntry {
    pub chart_instance_id: String,
    pub track_isrc: String,
    pub position: u32,
}

// ============================================================================
// Natural Keys
// ============================================================================

/// The five persisted entity kinds, in referential load order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ChartInstance,
    Artist,
    Track,
    ArtistTrack,
    ChartEntry,
}

impl EntityKind {
    /// Parents before children: instances and artists, then tracks, then join/fact rows.
    pub const LOAD_ORDER: [EntityKind; 5] = [
        EntityKind::ChartInstance,
        EntityKind::Artist,
        EntityKind::Track,
        EntityKind::ArtistTrack,
        EntityKind::ChartEntry,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::ChartInstance => "chart_instance",
            EntityKind::Artist => "artists",
            EntityKind::Track => "tracks",
            EntityKind::ArtistTrack => "artist_tracks",
            EntityKind::ChartEntry => "chart_entries",
        }
    }

    /// Column order used for inserts, reads and CSV export.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::ChartInstance => &["id", "date"],
            EntityKind::Artist => &[
                "id",
                "name",
                "genres",
                "followers",
                "musicbrainz_id",
                "artist_type",
                "country_of_origin",
                "year_of_origin",
                "disambiguation",
                "needs_review",
            ],
            EntityKind::Track => &["id", "spotify_track_id", "name", "album", "release_date"],
            EntityKind::ArtistTrack => &["artist_id", "track_isrc"],
            EntityKind::ChartEntry => &["chart_instance_id", "track_isrc", "position"],
        }
    }

    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::ChartInstance | EntityKind::Artist | EntityKind::Track => &["id"],
            EntityKind::ArtistTrack => &["artist_id", "track_isrc"],
            EntityKind::ChartEntry => &["chart_instance_id", "track_isrc"],
        }
    }

    /// Columns outside the natural key; empty for pure join records.
    pub fn value_columns(self) -> Vec<&'static str> {
        let keys = self.key_columns();
        self.columns()
            .iter()
            .copied()
            .filter(|c| !keys.contains(c))
            .collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Natural key of any emitted record. The variant carries the entity kind,
/// so a single set can hold keys of all five kinds without collisions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    ChartInstance(String),
    Track(String),
    Artist(String),
    ArtistTrack {
        artist_id: String,
        track_isrc: String,
    },
    ChartEntry {
        chart_instance_id: String,
        track_isrc: String,
    },
}

impl NaturalKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            NaturalKey::ChartInstance(_) => EntityKind::ChartInstance,
            NaturalKey::Track(_) => EntityKind::Track,
            NaturalKey::Artist(_) => EntityKind::Artist,
            NaturalKey::ArtistTrack { .. } => EntityKind::ArtistTrack,
            NaturalKey::ChartEntry { .. } => EntityKind::ChartEntry,
        }
    }

    pub fn artist_track(artist_id: &str, track_isrc: &str) -> Self {
        NaturalKey::ArtistTrack {
            artist_id: artist_id.to_string(),
            track_isrc: track_isrc.to_string(),
        }
    }

    pub fn chart_entry(chart_instance_id: &str, track_isrc: &str) -> Self {
        NaturalKey::ChartEntry {
            chart_instance_id: chart_instance_id.to_string(),
            track_isrc: track_isrc.to_string(),
        }
    }
}

// ============================================================================
// Batches
// ============================================================================

/// New records assembled for one chart date, in emission order.
/// Never contains an entity whose key was already known when it was seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batches {
    pub chart_instance: Option<ChartInstance>,
    pub tracks: Vec<Track>,
    pub artists: Vec<Artist>,
    pub artist_tracks: Vec<ArtistTrack>,
    pub chart_entries: Vec<ChartEntry>,
    pub outcome: BatchOutcome,
}

impl Batches {
    pub fn is_empty(&self) -> bool {
        self.chart_instance.is_none()
            && self.tracks.is_empty()
            && self.artists.is_empty()
            && self.artist_tracks.is_empty()
            && self.chart_entries.is_empty()
    }

    pub fn record_count(&self) -> usize {
        usize::from(self.chart_instance.is_some())
            + self.tracks.len()
            + self.artists.len()
            + self.artist_tracks.len()
            + self.chart_entries.len()
    }
}

/// Per-date resolution counters reported alongside the batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub rows: usize,
    pub blank_rows: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub lookup_failures: usize,
    /// Resolved rows whose (date, isrc) entry was already emitted earlier.
    pub duplicate_entries: usize,
}
