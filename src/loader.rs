//! Upsert loader: staging collections into the relational store.
//!
//! Each entity kind is written in its own transaction with
//! `INSERT ... ON CONFLICT (<natural key>) DO UPDATE`, so loading the same
//! collections again (or a superset of them) converges on the same rows.

use anyhow::{Context, Result};
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::path::Path;
use tracing::{error, info};

use crate::models::{Artist, ArtistTrack, ChartEntry, ChartInstance, EntityKind, Track};
use crate::schema::{self, Entity, RELATIONAL_SCHEMA};
use crate::staging::StagingStore;

/// Outcome of loading one entity kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub kind: EntityKind,
    pub attempted: usize,
    pub inserted: usize,
    /// Conflicting rows whose value columns were overwritten.
    pub updated: usize,
    /// Conflicting rows of key-only tables, left as they were.
    pub ignored: usize,
}

pub struct UpsertLoader {
    conn: Connection,
}

impl UpsertLoader {
    /// Open (or create) the relational database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open relational database {:?}", path))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(RELATIONAL_SCHEMA)
            .context("Failed to create relational schema")?;
        Ok(Self { conn })
    }

    /// Upsert `records` in one transaction. Any failing row rolls back the
    /// whole kind.
    pub fn upsert<E: Entity>(&mut self, records: &[E]) -> Result<LoadReport> {
        let kind = E::KIND;
        let before = self.count(kind)?;

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&schema::upsert_sql(kind))?;
            for (index, record) in records.iter().enumerate() {
                stmt.execute(params_from_iter(record.to_values()))
                    .with_context(|| {
                        format!(
                            "Failed to load {} row {} ({:?})",
                            kind,
                            index + 1,
                            record.natural_key()
                        )
                    })?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit {} load", kind))?;

        let inserted = self.count(kind)? - before;
        let conflicts = records.len() - inserted;
        let (updated, ignored) = if kind.value_columns().is_empty() {
            (0, conflicts)
        } else {
            (conflicts, 0)
        };

        Ok(LoadReport {
            kind,
            attempted: records.len(),
            inserted,
            updated,
            ignored,
        })
    }

    /// Read one collection from staging and upsert it.
    pub fn load_kind(&mut self, staging: &StagingStore, kind: EntityKind) -> Result<LoadReport> {
        match kind {
            EntityKind::ChartInstance => self.upsert(&staging.read_all::<ChartInstance>()?),
            EntityKind::Artist => self.upsert(&staging.read_all::<Artist>()?),
            EntityKind::Track => self.upsert(&staging.read_all::<Track>()?),
            EntityKind::ArtistTrack => self.upsert(&staging.read_all::<ArtistTrack>()?),
            EntityKind::ChartEntry => self.upsert(&staging.read_all::<ChartEntry>()?),
        }
    }

    /// Load every kind in dependency order. A failed kind is reported and
    /// the remaining kinds are still attempted.
    pub fn load_all(&mut self, staging: &StagingStore) -> Vec<(EntityKind, Result<LoadReport>)> {
        EntityKind::LOAD_ORDER
            .into_iter()
            .map(|kind| {
                let result = self.load_kind(staging, kind);
                match &result {
                    Ok(report) => info!(
                        table = %kind,
                        attempted = report.attempted,
                        inserted = report.inserted,
                        updated = report.updated,
                        ignored = report.ignored,
                        "Loaded"
                    ),
                    Err(e) => error!(table = %kind, error = %format!("{:#}", e), "Load failed"),
                }
                (kind, result)
            })
            .collect()
    }

    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn read_all<E: Entity>(&self) -> Result<Vec<E>> {
        let mut stmt = self.conn.prepare(&schema::select_sql(E::KIND))?;
        let records = stmt
            .query_map([], |row| E::from_row(row))?
            .collect::<rusqlite::Result<Vec<E>>>()?;
        Ok(records)
    }
}
