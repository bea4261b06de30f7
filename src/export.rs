//! CSV export of the staging collections, one file per entity kind.

use anyhow::{Context, Result};
use rusqlite::types::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{Artist, ArtistTrack, ChartEntry, ChartInstance, EntityKind, Track};
use crate::schema::Entity;
use crate::staging::StagingStore;

/// File name a collection is exported under.
pub fn file_name(kind: EntityKind) -> String {
    format!("{}.csv", kind.table())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(_) => String::new(),
    }
}

fn write_collection<E: Entity>(records: &[E], path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    writer.write_record(E::KIND.columns())?;
    for record in records {
        writer.write_record(record.to_values().iter().map(cell))?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Write all five collections into `dir`, creating it if needed.
/// Returns each written file with its row count.
pub fn export_all(staging: &StagingStore, dir: &Path) -> Result<Vec<(PathBuf, usize)>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;

    let mut written = Vec::new();
    for kind in EntityKind::LOAD_ORDER {
        let path = dir.join(file_name(kind));
        let rows = match kind {
            EntityKind::ChartInstance => {
                write_collection(&staging.read_all::<ChartInstance>()?, &path)?
            }
            EntityKind::Artist => write_collection(&staging.read_all::<Artist>()?, &path)?,
            EntityKind::Track => write_collection(&staging.read_all::<Track>()?, &path)?,
            EntityKind::ArtistTrack => {
                write_collection(&staging.read_all::<ArtistTrack>()?, &path)?
            }
            EntityKind::ChartEntry => write_collection(&staging.read_all::<ChartEntry>()?, &path)?,
        };
        written.push((path, rows));
    }
    Ok(written)
}
