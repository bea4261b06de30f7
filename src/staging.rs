//! Staging store: the persisted entity collections and the incremental writer.
//!
//! Every chart date is committed in a single SQLite transaction covering all
//! five collections and the processed marker, so a crash leaves either the
//! whole date on disk or none of it.

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;

use crate::models::{Batches, EntityKind, NaturalKey};
use crate::schema::{self, Entity, STAGING_SCHEMA};

pub struct StagingStore {
    conn: Connection,
}

impl StagingStore {
    /// Open (or create) a staging database on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open staging database {:?}", path))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(STAGING_SCHEMA)
            .context("Failed to create staging schema")?;
        Ok(Self { conn })
    }

    // ========================================================================
    // Incremental Writer
    // ========================================================================

    /// Append one chart date's new records atomically.
    ///
    /// Existing rows are never rewritten; appending a key that is already
    /// stored fails the whole commit. When `mark_processed` is set the date is
    /// recorded so later runs skip it.
    pub fn commit(
        &mut self,
        chart_instance_id: &str,
        batches: &Batches,
        mark_processed: bool,
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .with_context(|| format!("Failed to begin commit for {}", chart_instance_id))?;

        append(&tx, chart_instance_id, batches.chart_instance.iter())?;
        append(&tx, chart_instance_id, batches.artists.iter())?;
        append(&tx, chart_instance_id, batches.tracks.iter())?;
        append(&tx, chart_instance_id, batches.artist_tracks.iter())?;
        append(&tx, chart_instance_id, batches.chart_entries.iter())?;

        if mark_processed {
            tx.execute(
                "INSERT OR REPLACE INTO processed_dates (chart_instance_id, processed_at)
                 VALUES (?1, ?2)",
                params![chart_instance_id, chrono::Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("Failed to mark {} processed", chart_instance_id))?;
        }

        tx.commit()
            .with_context(|| format!("Failed to commit chart date {}", chart_instance_id))?;
        Ok(())
    }

    // ========================================================================
    // Readers
    // ========================================================================

    pub fn is_processed(&self, chart_instance_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM processed_dates WHERE chart_instance_id = ?1",
                [chart_instance_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Processed chart dates in ascending order.
    pub fn processed_dates(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT chart_instance_id FROM processed_dates ORDER BY chart_instance_id")?;
        let dates = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(dates)
    }

    /// Every record of one collection, in append order.
    pub fn read_all<E: Entity>(&self) -> Result<Vec<E>> {
        let mut stmt = self.conn.prepare(&schema::select_sql(E::KIND))?;
        let records = stmt
            .query_map([], |row| E::from_row(row))?
            .collect::<rusqlite::Result<Vec<E>>>()
            .with_context(|| format!("Failed to read {} from staging", E::KIND))?;
        Ok(records)
    }

    pub fn natural_keys(&self, kind: EntityKind) -> Result<Vec<NaturalKey>> {
        let mut stmt = self.conn.prepare(&schema::select_keys_sql(kind))?;
        let keys = stmt
            .query_map([], |row| schema::key_from_row(kind, row))?
            .collect::<rusqlite::Result<Vec<NaturalKey>>>()?;
        Ok(keys)
    }

    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn append<'a, E: Entity + 'a>(
    tx: &rusqlite::Transaction<'_>,
    chart_instance_id: &str,
    records: impl Iterator<Item = &'a E>,
) -> Result<()> {
    let mut stmt = tx.prepare_cached(&schema::insert_sql(E::KIND))?;
    for record in records {
        stmt.execute(params_from_iter(record.to_values()))
            .with_context(|| {
                format!(
                    "Failed to append {} {:?} for chart date {}",
                    E::KIND,
                    record.natural_key(),
                    chart_instance_id
                )
            })?;
    }
    Ok(())
}
