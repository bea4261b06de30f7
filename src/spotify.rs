//! Spotify Web API client implementing [`CatalogClient`].
//!
//! Uses the client-credentials flow; the access token is cached and
//! refreshed shortly before it expires. No pacing happens here: the
//! ingestion loop owns the rate-limit delay between lookups.

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::catalog::{ArtistProfile, CatalogArtist, CatalogClient, CatalogTrack, LookupError};
use crate::normalize::search_query;

const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// ============================================================================
// Wire Models
// ============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<TrackPage>,
}

#[derive(Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<SpotifyTrackItem>,
}

#[derive(Deserialize)]
struct SpotifyTrackItem {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    external_ids: ExternalIds,
    #[serde(default)]
    artists: Vec<SpotifyArtistRef>,
}

#[derive(Deserialize, Default)]
struct ExternalIds {
    isrc: Option<String>,
}

#[derive(Deserialize)]
struct SpotifyArtistRef {
    id: Option<String>,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct SpotifyArtistResponse {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    genres: Vec<String>,
    followers: Option<Followers>,
}

#[derive(Deserialize)]
struct Followers {
    total: Option<i64>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

// ============================================================================
// Client
// ============================================================================

pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: &str, client_secret: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("chart-ingest/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, fetching a new one when missing or about to expire.
    fn access_token(&self) -> Result<String, LookupError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| LookupError::Auth("token cache poisoned".to_string()))?;

        if let Some(token) = guard.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(SPOTIFY_TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(LookupError::Auth(format!(
                "token endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .map_err(|e| LookupError::Protocol(e.to_string()))?;

        let value = body.access_token.clone();
        *guard = Some(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(value)
    }

    /// Drop the cached token so the next request re-authenticates.
    fn invalidate_token(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, LookupError> {
        let token = self.access_token()?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .map_err(transport_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token();
        }
        Ok(response)
    }
}

impl CatalogClient for SpotifyClient {
    fn search_track(
        &self,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<CatalogTrack>, LookupError> {
        let q = search_query(track_name, artist_name);
        let url = format!("{}/search", SPOTIFY_API_BASE);
        let response = self.get(&url, &[("q", q.as_str()), ("type", "track"), ("limit", "1")])?;
        match read_body(response)? {
            Some(body) => parse_search_response(&body),
            None => {
                debug!(track = track_name, artist = artist_name, "Search rejected; no match");
                Ok(None)
            }
        }
    }

    fn artist_profile(&self, artist_id: &str) -> Result<Option<ArtistProfile>, LookupError> {
        let url = artist_url(artist_id)?;
        let response = self.get(url.as_str(), &[])?;
        match read_body(response)? {
            Some(body) => parse_artist_response(&body).map(Some),
            None => Ok(None),
        }
    }
}

/// `/artists/{id}` with the id percent-encoded as a single path segment.
fn artist_url(artist_id: &str) -> Result<Url, LookupError> {
    let mut url = Url::parse(SPOTIFY_API_BASE).map_err(|e| LookupError::Protocol(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| LookupError::Protocol("catalog base URL cannot take a path".to_string()))?
        .push("artists")
        .push(artist_id);
    Ok(url)
}

// ============================================================================
// Response Handling
// ============================================================================

fn transport_error(err: reqwest::Error) -> LookupError {
    LookupError::Network(err.to_string())
}

/// Body of a successful response. `Ok(None)` when the catalog rejected the
/// request itself, which is a miss and not worth retrying.
fn read_body(response: Response) -> Result<Option<String>, LookupError> {
    let status = response.status();
    if status.is_success() {
        return response.text().map(Some).map_err(transport_error);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    match classify_status(status, retry_after) {
        Some(err) => Err(err),
        None => Ok(None),
    }
}

/// Map a non-success status onto the failure taxonomy.
/// `None` marks a permanent rejection of the request (bad or over-long query,
/// unknown id): the same request would fail the same way on every run.
fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> Option<LookupError> {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::URI_TOO_LONG
        | StatusCode::UNPROCESSABLE_ENTITY => None,
        StatusCode::TOO_MANY_REQUESTS => Some(LookupError::RateLimited { retry_after }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(LookupError::Auth(format!(
            "catalog returned HTTP {}",
            status
        ))),
        other if other.is_server_error() || other == StatusCode::REQUEST_TIMEOUT => {
            Some(LookupError::Server {
                status: other.as_u16(),
            })
        }
        other => Some(LookupError::Protocol(format!("unexpected HTTP {}", other))),
    }
}

/// `Retry-After` is a number of seconds for this API.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Take the top search hit. Artists without an id are dropped.
fn parse_search_response(body: &str) -> Result<Option<CatalogTrack>, LookupError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| LookupError::Protocol(e.to_string()))?;

    let first = match parsed.tracks.and_then(|page| page.items.into_iter().next()) {
        Some(item) => item,
        None => return Ok(None),
    };

    let artists = first
        .artists
        .into_iter()
        .filter_map(|a| {
            a.id.filter(|id| !id.is_empty())
                .map(|id| CatalogArtist { id, name: a.name })
        })
        .collect();

    Ok(Some(CatalogTrack {
        id: first.id.filter(|id| !id.is_empty()),
        name: first.name,
        isrc: first.external_ids.isrc.filter(|isrc| !isrc.trim().is_empty()),
        artists,
    }))
}

fn parse_artist_response(body: &str) -> Result<ArtistProfile, LookupError> {
    let parsed: SpotifyArtistResponse =
        serde_json::from_str(body).map_err(|e| LookupError::Protocol(e.to_string()))?;

    Ok(ArtistProfile {
        id: parsed.id,
        name: parsed.name,
        genres: parsed.genres,
        followers: parsed.followers.and_then(|f| f.total),
    })
}
