//! Dedup ledger: which natural keys have already been emitted.
//!
//! The in-memory set only grows during a run. At startup it is rebuilt
//! from whatever the staging store actually holds, so a crashed run resumes
//! without re-emitting anything that reached disk.

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;

use crate::models::{EntityKind, NaturalKey};
use crate::staging::StagingStore;

#[derive(Debug, Default)]
pub struct Ledger {
    seen: FxHashSet<NaturalKey>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from every key durably present in the staging store.
    pub fn load_from(store: &StagingStore) -> Result<Self> {
        let mut ledger = Self::new();
        for kind in EntityKind::LOAD_ORDER {
            let keys = store
                .natural_keys(kind)
                .with_context(|| format!("Failed to read {} keys for ledger rebuild", kind))?;
            ledger.seen.extend(keys);
        }
        Ok(ledger)
    }

    pub fn contains(&self, key: &NaturalKey) -> bool {
        self.seen.contains(key)
    }

    /// Record a key. Returns true if it was not known before; re-recording is a no-op.
    pub fn record(&mut self, key: NaturalKey) -> bool {
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.seen.iter().filter(|k| k.kind() == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Artist, ArtistTrack, Batches, ChartEntry, ChartInstance, Track};
    use chrono::NaiveDate;

    #[test]
    fn test_record_is_idempotent() {
        let mut ledger = Ledger::new();
        assert!(ledger.record(NaturalKey::Track("ISRC1".into())));
        assert!(!ledger.record(NaturalKey::Track("ISRC1".into())));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains(&NaturalKey::Track("ISRC1".into())));
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let mut ledger = Ledger::new();
        ledger.record(NaturalKey::Artist("x".into()));
        assert!(!ledger.contains(&NaturalKey::Track("x".into())));
        assert!(ledger.contains(&NaturalKey::Artist("x".into())));
    }

    #[test]
    fn test_composite_keys() {
        let mut ledger = Ledger::new();
        ledger.record(NaturalKey::chart_entry("2020-01-04", "ISRC1"));
        assert!(ledger.contains(&NaturalKey::chart_entry("2020-01-04", "ISRC1")));
        assert!(!ledger.contains(&NaturalKey::chart_entry("2020-01-11", "ISRC1")));
        assert_eq!(ledger.count(EntityKind::ChartEntry), 1);
    }

    #[test]
    fn test_load_from_store_contains_every_persisted_key() {
        let mut store = StagingStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2020, 1, 4).unwrap();
        let instance = ChartInstance::new(date);
        let batches = Batches {
            chart_instance: Some(instance.clone()),
            tracks: vec![Track {
                id: "ISRC1".into(),
                spotify_track_id: "sp1".into(),
                name: "Song".into(),
                album: None,
                release_date: None,
            }],
            artists: vec![Artist::new("a1", "Artist")],
            artist_tracks: vec![ArtistTrack {
                artist_id: "a1".into(),
                track_isrc: "ISRC1".into(),
            }],
            chart_entries: vec![ChartEntry {
                chart_instance_id: instance.id.clone(),
                track_isrc: "ISRC1".into(),
                position: 1,
            }],
            ..Default::default()
        };
        store.commit(&instance.id, &batches, true).unwrap();

        let ledger = Ledger::load_from(&store).unwrap();
        assert_eq!(ledger.len(), 5);
        assert!(ledger.contains(&NaturalKey::ChartInstance("2020-01-04".into())));
        assert!(ledger.contains(&NaturalKey::Track("ISRC1".into())));
        assert!(ledger.contains(&NaturalKey::Artist("a1".into())));
        assert!(ledger.contains(&NaturalKey::artist_track("a1", "ISRC1")));
        assert!(ledger.contains(&NaturalKey::chart_entry("2020-01-04", "ISRC1")));
    }
}
