//! Entity resolution: charted (track, artist) strings to catalog identities.

use crate::catalog::{CatalogArtist, CatalogClient, LookupError};
use crate::normalize::normalize_artist_name;

/// Outcome of resolving one chart row.
#[derive(Debug)]
pub enum Resolution {
    /// Top catalog hit carried an ISRC and a track id.
    Resolved(ResolvedTrack),
    /// No hit, or a hit without a usable identifier.
    Unresolved,
    /// The catalog call itself failed; the row may succeed on a later attempt.
    LookupFailed(LookupError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub isrc: String,
    pub canonical_track_id: String,
    pub canonical_track_name: String,
    pub artists: Vec<CatalogArtist>,
}

/// Resolves rows with exactly one catalog call each. Holds no mutable state.
pub struct Resolver<C> {
    catalog: C,
}

impl<C: CatalogClient> Resolver<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn resolve(&self, track_name: &str, artist_name: &str) -> Resolution {
        let artist = normalize_artist_name(artist_name);

        let hit = match self.catalog.search_track(track_name.trim(), &artist) {
            Ok(Some(hit)) => hit,
            Ok(None) => return Resolution::Unresolved,
            Err(err) => return Resolution::LookupFailed(err),
        };

        match (hit.isrc, hit.id) {
            (Some(isrc), Some(id)) => Resolution::Resolved(ResolvedTrack {
                isrc: isrc.trim().to_uppercase(),
                canonical_track_id: id,
                canonical_track_name: if hit.name.is_empty() {
                    track_name.trim().to_string()
                } else {
                    hit.name
                },
                artists: hit.artists,
            }),
            _ => Resolution::Unresolved,
        }
    }
}
