//! Core data models for portal listings and TMDB metadata
//!
//! This module contains the data types carried by the listing cache and the
//! enrichment pipeline, plus the TMDB client submodule.

pub mod tmdb;

pub use tmdb::{CachedLookup, RateLimitExhausted, TmdbClient};

use serde::{Deserialize, Serialize};

/// One of the three content listings the upstream portal organizes content
/// into: video-on-demand, series, or live TV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingKind {
    Vod,
    Series,
    Tv,
}

impl ListingKind {
    /// All listing kinds, in the order the portal menus present them.
    pub const ALL: [ListingKind; 3] = [ListingKind::Vod, ListingKind::Series, ListingKind::Tv];

    /// The short name used in cache file names and CLI arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Vod => "vod",
            ListingKind::Series => "series",
            ListingKind::Tv => "tv",
        }
    }

    pub fn from_str(s: &str) -> Option<ListingKind> {
        match s.to_lowercase().trim() {
            "vod" | "movies" => Some(ListingKind::Vod),
            "series" => Some(ListingKind::Series),
            "tv" | "itv" => Some(ListingKind::Tv),
            _ => None,
        }
    }

    /// The metadata search kind for this listing, if it can be enriched.
    /// Live TV channels carry no searchable title, so they never are.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            ListingKind::Vod => Some(MediaKind::Movie),
            ListingKind::Series => Some(MediaKind::Tv),
            ListingKind::Tv => None,
        }
    }
}

impl std::fmt::Display for ListingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two media kinds the metadata backend distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    #[serde(rename = "movie")]
    Movie,
    #[serde(rename = "tvshow")]
    Tv,
}

impl MediaKind {
    /// The path segment the TMDB search and genre endpoints use.
    pub fn api_path(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }

    pub fn from_str(s: &str) -> Option<MediaKind> {
        match s.to_lowercase().trim() {
            "movie" | "movies" => Some(MediaKind::Movie),
            "tv" | "series" | "tvshow" => Some(MediaKind::Tv),
            _ => None,
        }
    }
}

/// A category as reported by the portal listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
}

/// A raw video entry as reported by the portal listing. Cached verbatim;
/// enrichment never mutates these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub name: String,
    /// Release year when the portal reports one
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub description: String,
    /// Portal-provided thumbnail, kept as a fallback when enrichment is off
    #[serde(default)]
    pub screenshot_uri: Option<String>,
}

/// Parsed TMDB metadata for one title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub tmdb_id: String,
    pub title: String,
    pub plot: String,
    /// Four-digit release year, 0 when the backend reports none
    pub year: u16,
    pub rating: f64,
    pub votes: u32,
    pub poster: Option<String>,
    pub fanart: Option<String>,
    pub genres: Vec<String>,
    pub media_type: MediaKind,
}
