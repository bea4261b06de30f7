//! Table definitions and row mapping for the five entity collections.
//!
//! The staging store and the relational store share column layouts
//! (see [`EntityKind::columns`]); only the relational store declares
//! foreign keys.

use chrono::NaiveDate;
use rusqlite::types::{Type, Value};
use rusqlite::Row;

use crate::models::{
    Artist, ArtistTrack, ChartEntry, ChartInstance, EntityKind, NaturalKey, Track,
};

// ============================================================================
// DDL
// ============================================================================

/// Append-only collections plus the processed-date markers.
pub const STAGING_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS chart_instance (
        id TEXT PRIMARY KEY,
        date TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS artists (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        genres TEXT,
        followers INTEGER,
        musicbrainz_id TEXT,
        artist_type TEXT,
        country_of_origin TEXT,
        year_of_origin TEXT,
        disambiguation TEXT,
        needs_review INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS tracks (
        id TEXT PRIMARY KEY,
        spotify_track_id TEXT NOT NULL,
        name TEXT NOT NULL,
        album TEXT,
        release_date TEXT
    );
    CREATE TABLE IF NOT EXISTS artist_tracks (
        artist_id TEXT NOT NULL,
        track_isrc TEXT NOT NULL,
        PRIMARY KEY (artist_id, track_isrc)
    );
    CREATE TABLE IF NOT EXISTS chart_entries (
        chart_instance_id TEXT NOT NULL,
        track_isrc TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (chart_instance_id, track_isrc)
    );
    CREATE TABLE IF NOT EXISTS processed_dates (
        chart_instance_id TEXT PRIMARY KEY,
        processed_at TEXT NOT NULL
    );";

/// Load target. Natural keys are primary keys; children reference parents.
pub const RELATIONAL_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS chart_instance (
        id TEXT PRIMARY KEY,
        date TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS artists (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        genres TEXT,
        followers INTEGER,
        musicbrainz_id TEXT,
        artist_type TEXT,
        country_of_origin TEXT,
        year_of_origin TEXT,
        disambiguation TEXT,
        needs_review INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS tracks (
        id TEXT PRIMARY KEY,
        spotify_track_id TEXT NOT NULL,
        name TEXT NOT NULL,
        album TEXT,
        release_date TEXT
    );
    CREATE TABLE IF NOT EXISTS artist_tracks (
        artist_id TEXT NOT NULL REFERENCES artists(id),
        track_isrc TEXT NOT NULL REFERENCES tracks(id),
        PRIMARY KEY (artist_id, track_isrc)
    );
    CREATE TABLE IF NOT EXISTS chart_entries (
        chart_instance_id TEXT NOT NULL REFERENCES chart_instance(id),
        track_isrc TEXT NOT NULL REFERENCES tracks(id),
        position INTEGER NOT NULL,
        PRIMARY KEY (chart_instance_id, track_isrc)
    );";

// ============================================================================
// SQL Builders
// ============================================================================

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Plain append; a key collision is an error.
pub fn insert_sql(kind: EntityKind) -> String {
    let columns = kind.columns();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        kind.table(),
        columns.join(", "),
        placeholders(columns.len())
    )
}

/// Conflict-tolerant write keyed by the natural key.
/// Last write wins on value columns; key-only tables ignore the conflict.
pub fn upsert_sql(kind: EntityKind) -> String {
    let value_columns = kind.value_columns();
    let on_conflict = if value_columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let assignments: Vec<String> = value_columns
            .iter()
            .map(|c| format!("{} = excluded.{}", c, c))
            .collect();
        format!("DO UPDATE SET {}", assignments.join(", "))
    };
    format!(
        "{} ON CONFLICT ({}) {}",
        insert_sql(kind),
        kind.key_columns().join(", "),
        on_conflict
    )
}

/// Rows in append order.
pub fn select_sql(kind: EntityKind) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY rowid",
        kind.columns().join(", "),
        kind.table()
    )
}

// ============================================================================
// Entity Mapping
// ============================================================================

/// A record persisted in one of the five collections.
/// `to_values` and `from_row` follow [`EntityKind::columns`] order.
pub trait Entity: Sized {
    const KIND: EntityKind;

    fn natural_key(&self) -> NaturalKey;

    fn to_values(&self) -> Vec<Value>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: &Option<String>) -> Value {
    s.as_deref().map_or(Value::Null, text)
}

fn date_value(d: NaiveDate) -> Value {
    Value::Text(d.format("%Y-%m-%d").to_string())
}

impl Entity for ChartInstance {
    const KIND: EntityKind = EntityKind::ChartInstance;

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::ChartInstance(self.id.clone())
    }

    fn to_values(&self) -> Vec<Value> {
        vec![text(&self.id), date_value(self.date)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
        })
    }
}

impl Entity for Artist {
    const KIND: EntityKind = EntityKind::Artist;

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::Artist(self.id.clone())
    }

    fn to_values(&self) -> Vec<Value> {
        let genres = match &self.genres {
            Some(g) => Value::Text(serde_json::to_string(g).unwrap_or_else(|_| "[]".to_string())),
            None => Value::Null,
        };
        vec![
            text(&self.id),
            text(&self.name),
            genres,
            self.followers.map_or(Value::Null, Value::Integer),
            opt_text(&self.musicbrainz_id),
            opt_text(&self.artist_type),
            opt_text(&self.country_of_origin),
            opt_text(&self.year_of_origin),
            opt_text(&self.disambiguation),
            Value::Integer(i64::from(self.needs_review)),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let genres_json: Option<String> = row.get(2)?;
        let genres = match genres_json {
            Some(json) => Some(serde_json::from_str::<Vec<String>>(&json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
            })?),
            None => None,
        };
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            genres,
            followers: row.get(3)?,
            musicbrainz_id: row.get(4)?,
            artist_type: row.get(5)?,
            country_of_origin: row.get(6)?,
            year_of_origin: row.get(7)?,
            disambiguation: row.get(8)?,
            needs_review: row.get(9)?,
        })
    }
}

impl Entity for Track {
    const KIND: EntityKind = EntityKind::Track;

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::Track(self.id.clone())
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.id),
            text(&self.spotify_track_id),
            text(&self.name),
            opt_text(&self.album),
            self.release_date.map_or(Value::Null, date_value),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            spotify_track_id: row.get(1)?,
            name: row.get(2)?,
            album: row.get(3)?,
            release_date: row.get(4)?,
        })
    }
}

impl Entity for ArtistTrack {
    const KIND: EntityKind = EntityKind::ArtistTrack;

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::artist_track(&self.artist_id, &self.track_isrc)
    }

    fn to_values(&self) -> Vec<Value> {
        vec![text(&self.artist_id), text(&self.track_isrc)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            artist_id: row.get(0)?,
            track_isrc: row.get(1)?,
        })
    }
}

impl Entity for ChartEntry {
    const KIND: EntityKind = EntityKind::ChartEntry;

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::chart_entry(&self.chart_instance_id, &self.track_isrc)
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.chart_instance_id),
            text(&self.track_isrc),
            Value::Integer(i64::from(self.position)),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            chart_instance_id: row.get(0)?,
            track_isrc: row.get(1)?,
            position: row.get(2)?,
        })
    }
}

/// Read the natural key straight off a row of `kind`'s table.
pub fn key_from_row(kind: EntityKind, row: &Row<'_>) -> rusqlite::Result<NaturalKey> {
    Ok(match kind {
        EntityKind::ChartInstance => NaturalKey::ChartInstance(row.get(0)?),
        EntityKind::Artist => NaturalKey::Artist(row.get(0)?),
        EntityKind::Track => NaturalKey::Track(row.get(0)?),
        EntityKind::ArtistTrack => NaturalKey::ArtistTrack {
            artist_id: row.get(0)?,
            track_isrc: row.get(1)?,
        },
        EntityKind::ChartEntry => NaturalKey::ChartEntry {
            chart_instance_id: row.get(0)?,
            track_isrc: row.get(1)?,
        },
    })
}

/// `SELECT <key columns> FROM <table>` for ledger rebuilds.
pub fn select_keys_sql(kind: EntityKind) -> String {
    format!(
        "SELECT {} FROM {}",
        kind.key_columns().join(", "),
        kind.table()
    )
}
