//! External music catalog boundary.
//!
//! The resolver and the enrichment passes only ever see the catalog through
//! [`CatalogClient`]. Transport failures are classified into [`LookupError`]
//! so callers can tell a transient failure from a genuine miss.

use std::time::Duration;
use thiserror::Error;

/// Top search hit for a (title, artist) query, as returned by the catalog.
/// Identifier fields are optional because the catalog does not guarantee them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogTrack {
    pub id: Option<String>,
    pub name: String,
    pub isrc: Option<String>,
    pub artists: Vec<CatalogArtist>,
}

/// A credited artist on a catalog track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
}

/// Direct artist record, consumed by the genre/follower enrichment pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtistProfile {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub followers: Option<i64>,
}

/// Transient failure talking to the catalog.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("catalog returned HTTP {status}")]
    Server { status: u16 },
    #[error("unexpected catalog response: {0}")]
    Protocol(String),
}

impl LookupError {
    /// Minimum wait the service asked for before the next request, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LookupError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Search-and-lookup contract of the external catalog.
pub trait CatalogClient {
    /// Best-effort search; `Ok(None)` means the catalog had no hit at all.
    fn search_track(
        &self,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<CatalogTrack>, LookupError>;

    /// Fetch the artist record with genres and follower count.
    fn artist_profile(&self, artist_id: &str) -> Result<Option<ArtistProfile>, LookupError>;
}

impl<C: CatalogClient + ?Sized> CatalogClient for &C {
    fn search_track(
        &self,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<CatalogTrack>, LookupError> {
        (**self).search_track(track_name, artist_name)
    }

    fn artist_profile(&self, artist_id: &str) -> Result<Option<ArtistProfile>, LookupError> {
        (**self).artist_profile(artist_id)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory catalog for tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Clone)]
    enum Scripted {
        Hit(CatalogTrack),
        Fail,
        RateLimited(Duration),
    }

    /// Answers searches keyed by (title, normalized artist).
    /// Unknown keys are misses. Every call is recorded.
    #[derive(Default)]
    pub struct FakeCatalog {
        hits: HashMap<(String, String), Scripted>,
        failures_left: RefCell<HashMap<(String, String), usize>>,
        profiles: HashMap<String, ArtistProfile>,
        pub calls: RefCell<Vec<(String, String)>>,
    }

    impl FakeCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a hit with a usable ISRC and the given credited artists.
        pub fn hit(
            mut self,
            title: &str,
            artist: &str,
            isrc: &str,
            artists: &[(&str, &str)],
        ) -> Self {
            let track = CatalogTrack {
                id: Some(format!("sp-{}", isrc.to_lowercase())),
                name: title.to_string(),
                isrc: Some(isrc.to_string()),
                artists: artists
                    .iter()
                    .map(|(id, name)| CatalogArtist {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                    .collect(),
            };
            self.hits
                .insert((title.to_string(), artist.to_string()), Scripted::Hit(track));
            self
        }

        /// Register a hit that carries no ISRC.
        pub fn hit_without_isrc(mut self, title: &str, artist: &str) -> Self {
            let track = CatalogTrack {
                id: Some("sp-no-isrc".to_string()),
                name: title.to_string(),
                isrc: None,
                artists: vec![],
            };
            self.hits
                .insert((title.to_string(), artist.to_string()), Scripted::Hit(track));
            self
        }

        /// Every search for this key fails.
        pub fn failing(mut self, title: &str, artist: &str) -> Self {
            self.hits
                .insert((title.to_string(), artist.to_string()), Scripted::Fail);
            self
        }

        /// Every search for this key is throttled with the given retry hint.
        pub fn rate_limited(mut self, title: &str, artist: &str, retry_after: Duration) -> Self {
            self.hits.insert(
                (title.to_string(), artist.to_string()),
                Scripted::RateLimited(retry_after),
            );
            self
        }

        /// The next `times` searches for this key fail, then the scripted answer applies.
        pub fn flaky(self, title: &str, artist: &str, times: usize) -> Self {
            self.failures_left
                .borrow_mut()
                .insert((title.to_string(), artist.to_string()), times);
            self
        }

        pub fn profile(mut self, profile: ArtistProfile) -> Self {
            self.profiles.insert(profile.id.clone(), profile);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl CatalogClient for FakeCatalog {
        fn search_track(
            &self,
            track_name: &str,
            artist_name: &str,
        ) -> Result<Option<CatalogTrack>, LookupError> {
            let key = (track_name.to_string(), artist_name.to_string());
            self.calls.borrow_mut().push(key.clone());

            if let Some(left) = self.failures_left.borrow_mut().get_mut(&key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(LookupError::Network("scripted flake".to_string()));
                }
            }

            match self.hits.get(&key) {
                Some(Scripted::Hit(track)) => Ok(Some(track.clone())),
                Some(Scripted::Fail) => Err(LookupError::Server { status: 503 }),
                Some(Scripted::RateLimited(wait)) => Err(LookupError::RateLimited {
                    retry_after: Some(*wait),
                }),
                None => Ok(None),
            }
        }

        fn artist_profile(&self, artist_id: &str) -> Result<Option<ArtistProfile>, LookupError> {
            Ok(self.profiles.get(artist_id).cloned())
        }
    }
}
