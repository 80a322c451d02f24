//! TMDB (The Movie Database) client for metadata enrichment
//!
//! Searches the TMDB REST API v3 for movie and TV metadata through a
//! sliding-window rate limiter, and keeps a three-tier response cache in one
//! shared JSON file: positive results, explicit negative ("confirmed no
//! match") entries, and the per-kind genre-id lookup tables under reserved
//! keys. The cache is mutated in memory and persisted with a single
//! [`TmdbClient::flush`] call per batch.
//!
//! Throttling follows a small state machine: a 429 response puts the client
//! into a capped backoff sleep; three consecutive 429s with no intervening
//! success abort the client permanently. The abort is surfaced exactly once,
//! as [`RateLimitExhausted`], so a bulk caller can stop instead of silently
//! producing incomplete data.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cache::store;
use crate::data::{MediaInfo, MediaKind};
use crate::rate_limit::RateLimiter;

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
const TMDB_FANART_BASE: &str = "https://image.tmdb.org/t/p/w1280";

/// Shared cache file for every metadata entry, including the genre tables.
const CACHE_FILE: &str = "tmdb_cache.json";

/// Reserved cache-key prefix for the genre tables. Title keys always start
/// with `movie:` or `tv:`, so this can never collide.
const GENRE_KEY_PREFIX: &str = "__genres:";

/// Consecutive 429 responses after which the client goes inert.
const MAX_CONSECUTIVE_429: u32 = 3;

/// Backoff used when the 429 carries no Retry-After header.
const DEFAULT_BACKOFF: StdDuration = StdDuration::from_secs(10);

/// Upper bound on any server-supplied backoff.
const MAX_BACKOFF: StdDuration = StdDuration::from_secs(60);

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// The metadata backend throttled this client repeatedly; the current batch
/// must stop. The client stays inert afterwards - construct a fresh one to
/// retry.
///
/// This is the only failure the client surfaces: transient faults degrade to
/// "no result this attempt" instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("metadata backend is rate limiting this client; lookups aborted")]
pub struct RateLimitExhausted;

/// Three-way cache lookup outcome. The distinction between `Miss` and
/// `NoMatch` is load-bearing: a confirmed-absent title must not be
/// re-queried, while an unqueried title must trigger a network call.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedLookup {
    /// Never queried (or the entry expired): a network call is due
    Miss,
    /// Queried before, confirmed no match: do not query again
    NoMatch,
    /// Queried before, metadata on file
    Found(MediaInfo),
}

/// One entry of the shared cache file. `data` is the parsed metadata, the
/// genre table, or JSON `null` as the negative marker.
#[derive(Debug, serde::Serialize, Deserialize)]
struct CacheSlot {
    #[serde(with = "chrono::serde::ts_seconds")]
    ts: DateTime<Utc>,
    data: Value,
}

/// Consecutive-429 bookkeeping. Owned by one client; never shared.
#[derive(Debug, Default)]
struct ThrottleState {
    consecutive_429: u32,
    aborted: bool,
}

impl ThrottleState {
    fn record_success(&mut self) {
        self.consecutive_429 = 0;
    }

    /// Counts a 429. Returns `true` exactly once: on the call that crosses
    /// the abort threshold.
    fn record_rate_limited(&mut self) -> bool {
        if self.aborted {
            return false;
        }
        self.consecutive_429 += 1;
        if self.consecutive_429 >= MAX_CONSECUTIVE_429 {
            self.aborted = true;
            return true;
        }
        false
    }
}

/// Client for TMDB search lookups with a persistent local cache.
pub struct TmdbClient {
    http: Client,
    api_key: String,
    language: String,
    cache_path: PathBuf,
    ttl: Duration,
    cache: HashMap<String, CacheSlot>,
    limiter: RateLimiter,
    throttle: ThrottleState,
}

impl TmdbClient {
    /// Creates a client over the shared cache file under `storage_root`,
    /// loading any previously persisted entries. `cache_days` of 0 disables
    /// expiry.
    pub fn new(
        storage_root: &Path,
        api_key: impl Into<String>,
        language: impl Into<String>,
        cache_days: u32,
    ) -> Self {
        let cache_path = storage_root.join(CACHE_FILE);
        let cache = load_cache(&cache_path);
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            language: language.into(),
            cache_path,
            ttl: Duration::days(cache_days as i64),
            cache,
            limiter: RateLimiter::default(),
            throttle: ThrottleState::default(),
        }
    }

    /// True once the client has gone inert after repeated throttling. Batch
    /// callers check this between items to stop issuing lookups.
    pub fn is_aborted(&self) -> bool {
        self.throttle.aborted
    }

    /// Searches TMDB for a movie. Cache first; a present negative entry
    /// short-circuits without a network call.
    pub async fn lookup_movie(
        &mut self,
        title: &str,
        year: Option<u16>,
    ) -> Result<Option<MediaInfo>, RateLimitExhausted> {
        self.lookup(MediaKind::Movie, title, year).await
    }

    /// Searches TMDB for a TV show. Cache first, like [`Self::lookup_movie`].
    pub async fn lookup_series(
        &mut self,
        title: &str,
        year: Option<u16>,
    ) -> Result<Option<MediaInfo>, RateLimitExhausted> {
        self.lookup(MediaKind::Tv, title, year).await
    }

    /// Cache-only probe for a title, without any network activity.
    pub fn cached(&self, kind: MediaKind, title: &str, year: Option<u16>) -> CachedLookup {
        self.cached_by_key(&cache_key(kind, title, year))
    }

    /// Returns the genre-id to name table for a media kind, fetching it at
    /// most once per cache lifetime. A transient fetch failure yields an
    /// empty table and is retried on the next call, never cached.
    pub async fn genre_map(
        &mut self,
        kind: MediaKind,
    ) -> Result<HashMap<u32, String>, RateLimitExhausted> {
        if self.throttle.aborted {
            return Ok(HashMap::new());
        }
        let key = genre_key(kind);
        if let Some(slot) = self.cache.get(&key) {
            if self.is_fresh(slot) && !slot.data.is_null() {
                match serde_json::from_value::<HashMap<u32, String>>(slot.data.clone()) {
                    Ok(map) => return Ok(map),
                    Err(err) => {
                        warn!(key = %key, error = %err, "discarding unreadable genre table")
                    }
                }
            }
        }

        let api_key = self.api_key.clone();
        let language = self.language.clone();
        let url = format!("{}/genre/{}/list", TMDB_API_BASE, kind.api_path());
        let params = [("api_key", api_key.as_str()), ("language", language.as_str())];
        let Some(body) = self.get_json(&url, &params).await? else {
            return Ok(HashMap::new());
        };
        let parsed: GenreListResponse = match serde_json::from_value(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "TMDB genre list response malformed");
                return Ok(HashMap::new());
            }
        };
        let map: HashMap<u32, String> =
            parsed.genres.into_iter().map(|g| (g.id, g.name)).collect();
        match serde_json::to_value(&map) {
            Ok(data) => {
                self.cache.insert(key, CacheSlot { ts: Utc::now(), data });
            }
            Err(err) => warn!(error = %err, "genre table not cacheable"),
        }
        Ok(map)
    }

    /// Persists the entire in-memory cache in one write. Call once after a
    /// batch of lookups, not after each one.
    pub fn flush(&self) {
        if let Err(err) = store::write_json(&self.cache_path, &self.cache) {
            warn!(path = %self.cache_path.display(), error = %err, "TMDB cache save failed");
        }
    }

    async fn lookup(
        &mut self,
        kind: MediaKind,
        title: &str,
        year: Option<u16>,
    ) -> Result<Option<MediaInfo>, RateLimitExhausted> {
        if self.throttle.aborted {
            return Ok(None);
        }
        let key = cache_key(kind, title, year);
        match self.cached_by_key(&key) {
            CachedLookup::Found(info) => return Ok(Some(info)),
            CachedLookup::NoMatch => {
                debug!(key = %key, "negative cache hit");
                return Ok(None);
            }
            CachedLookup::Miss => {}
        }

        let genres = self.genre_map(kind).await?;

        let api_key = self.api_key.clone();
        let language = self.language.clone();
        let year_param;
        let url = format!("{}/search/{}", TMDB_API_BASE, kind.api_path());
        let mut params: Vec<(&str, &str)> = vec![
            ("api_key", api_key.as_str()),
            ("query", title),
            ("language", language.as_str()),
        ];
        if kind == MediaKind::Movie {
            params.push(("include_adult", "false"));
        }
        if let Some(year) = year {
            year_param = year.to_string();
            let name = match kind {
                MediaKind::Movie => "year",
                MediaKind::Tv => "first_air_date_year",
            };
            params.push((name, year_param.as_str()));
        }

        let Some(body) = self.get_json(&url, &params).await? else {
            // Transient failure: not cached, so a future pass retries.
            return Ok(None);
        };
        let response: SearchResponse = match serde_json::from_value(body) {
            Ok(response) => response,
            Err(err) => {
                warn!(title, error = %err, "TMDB search response malformed");
                return Ok(None);
            }
        };

        let outcome = response.results.first().map(|top| match kind {
            MediaKind::Movie => parse_movie(top, &genres),
            MediaKind::Tv => parse_tv(top, &genres),
        });
        self.store(key, outcome.as_ref());
        Ok(outcome)
    }

    /// One rate-limited GET. `Ok(None)` means "no result this attempt":
    /// transport failure, unexpected status, or a 429 below the abort
    /// threshold. `Err` is raised exactly once, at the abort transition.
    async fn get_json(
        &mut self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<Value>, RateLimitExhausted> {
        self.limiter.admit().await;

        let result = self
            .http
            .get(url)
            .query(params)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(url, error = %err, "TMDB request failed");
                return Ok(None);
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let delay = retry_after(response.headers())
                .unwrap_or(DEFAULT_BACKOFF)
                .min(MAX_BACKOFF);
            let crossed_threshold = self.throttle.record_rate_limited();
            warn!(
                delay_s = delay.as_secs(),
                streak = self.throttle.consecutive_429,
                "TMDB throttled the request"
            );
            sleep(delay).await;
            if crossed_threshold {
                warn!("TMDB keeps throttling, aborting lookups for this client");
                return Err(RateLimitExhausted);
            }
            return Ok(None);
        }
        if !status.is_success() {
            warn!(url, status = %status, "TMDB returned an error status");
            return Ok(None);
        }

        self.throttle.record_success();
        match response.json::<Value>().await {
            Ok(body) => Ok(Some(body)),
            Err(err) => {
                warn!(url, error = %err, "TMDB response body unreadable");
                Ok(None)
            }
        }
    }

    fn cached_by_key(&self, key: &str) -> CachedLookup {
        let Some(slot) = self.cache.get(key) else {
            return CachedLookup::Miss;
        };
        if !self.is_fresh(slot) {
            return CachedLookup::Miss;
        }
        if slot.data.is_null() {
            return CachedLookup::NoMatch;
        }
        match serde_json::from_value::<MediaInfo>(slot.data.clone()) {
            Ok(info) => CachedLookup::Found(info),
            Err(err) => {
                warn!(key, error = %err, "discarding unreadable cache entry");
                CachedLookup::Miss
            }
        }
    }

    /// Stores a lookup outcome in memory only; `None` becomes the explicit
    /// negative marker. [`Self::flush`] persists the map.
    fn store(&mut self, key: String, info: Option<&MediaInfo>) {
        let data = match info {
            Some(info) => match serde_json::to_value(info) {
                Ok(value) => value,
                Err(err) => {
                    warn!(key = %key, error = %err, "metadata entry not cacheable");
                    return;
                }
            },
            None => Value::Null,
        };
        self.cache.insert(key, CacheSlot { ts: Utc::now(), data });
    }

    fn is_fresh(&self, slot: &CacheSlot) -> bool {
        self.ttl.is_zero() || Utc::now().signed_duration_since(slot.ts) < self.ttl
    }
}

fn cache_key(kind: MediaKind, title: &str, year: Option<u16>) -> String {
    let year = year.map(|y| y.to_string()).unwrap_or_default();
    format!(
        "{}:{}:{}",
        kind.api_path(),
        title.trim().to_lowercase(),
        year
    )
}

fn genre_key(kind: MediaKind) -> String {
    format!("{}{}", GENRE_KEY_PREFIX, kind.api_path())
}

fn load_cache(path: &Path) -> HashMap<String, CacheSlot> {
    let content = match fs::read_to_string(path) {
        Ok(content) if !content.is_empty() => content,
        _ => return HashMap::new(),
    };
    match serde_json::from_str(&content) {
        Ok(cache) => cache,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "TMDB cache load failed, starting empty");
            HashMap::new()
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<StdDuration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(StdDuration::from_secs)
}

/// Four-digit year from the leading characters of a release-date string;
/// absent or malformed dates yield 0.
fn parse_year(date: Option<&str>) -> u16 {
    date.and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok())
        .unwrap_or(0)
}

fn image_url(base: &str, path: Option<&str>) -> Option<String> {
    path.map(|p| format!("{}{}", base, p))
}

fn resolve_genres(ids: &[u32], table: &HashMap<u32, String>) -> Vec<String> {
    // Ids the table does not know are dropped, not errored.
    ids.iter().filter_map(|id| table.get(id).cloned()).collect()
}

fn parse_movie(data: &SearchResult, genres: &HashMap<u32, String>) -> MediaInfo {
    MediaInfo {
        tmdb_id: data.id.to_string(),
        title: data.title.clone().unwrap_or_default(),
        plot: data.overview.clone().unwrap_or_default(),
        year: parse_year(data.release_date.as_deref()),
        rating: data.vote_average.unwrap_or(0.0),
        votes: data.vote_count.unwrap_or(0),
        poster: image_url(TMDB_IMAGE_BASE, data.poster_path.as_deref()),
        fanart: image_url(TMDB_FANART_BASE, data.backdrop_path.as_deref()),
        genres: resolve_genres(&data.genre_ids, genres),
        media_type: MediaKind::Movie,
    }
}

fn parse_tv(data: &SearchResult, genres: &HashMap<u32, String>) -> MediaInfo {
    MediaInfo {
        tmdb_id: data.id.to_string(),
        title: data.name.clone().unwrap_or_default(),
        plot: data.overview.clone().unwrap_or_default(),
        year: parse_year(data.first_air_date.as_deref()),
        rating: data.vote_average.unwrap_or(0.0),
        votes: data.vote_count.unwrap_or(0),
        poster: image_url(TMDB_IMAGE_BASE, data.poster_path.as_deref()),
        fanart: image_url(TMDB_FANART_BASE, data.backdrop_path.as_deref()),
        genres: resolve_genres(&data.genre_ids, genres),
        media_type: MediaKind::Tv,
    }
}

/// TMDB search response envelope.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// One search result. Movie and TV results share a shape except for the
/// title and date field names.
#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f64>,
    vote_count: Option<u32>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    #[serde(default)]
    genre_ids: Vec<u32>,
}

/// TMDB genre list response.
#[derive(Debug, Deserialize)]
struct GenreListResponse {
    #[serde(default)]
    genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    id: u32,
    name: String,
}
