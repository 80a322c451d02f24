//! Runtime configuration for the cache layer and TMDB enrichment
//!
//! Collaborators (the host settings screen, the CLI) hand the core a
//! `Settings` value; nothing in here reads a settings backend itself.

use std::path::PathBuf;

/// Default listing-cache validity when no setting is present (24 hours).
pub const LISTING_CACHE_DEFAULT_DAYS: u32 = 1;

/// Default TMDB-cache validity when no setting is present.
pub const METADATA_CACHE_DEFAULT_DAYS: u32 = 30;

/// Top-level settings consumed by the core.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding every persisted cache file
    pub storage_dir: PathBuf,
    /// Portal endpoint as configured by the user
    pub server_address: String,
    /// Device MAC string as configured by the user
    pub mac_address: String,
    /// Listing-cache validity in days (0 = never expire)
    pub listing_cache_days: u32,
    /// TMDB enrichment settings
    pub tmdb: TmdbSettings,
}

/// TMDB enrichment settings, including per-field toggles.
#[derive(Debug, Clone)]
pub struct TmdbSettings {
    /// Master switch for enrichment
    pub enabled: bool,
    /// TMDB API v3 key
    pub api_key: String,
    /// Preferred result language tag (e.g. "en-US")
    pub language: String,
    /// TMDB-cache validity in days (0 = never expire)
    pub cache_days: u32,
    pub use_poster: bool,
    pub use_fanart: bool,
    pub use_plot: bool,
    pub use_rating: bool,
    pub use_genres: bool,
}

impl Default for TmdbSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            language: "en-US".to_string(),
            cache_days: METADATA_CACHE_DEFAULT_DAYS,
            use_poster: true,
            use_fanart: true,
            use_plot: true,
            use_rating: true,
            use_genres: true,
        }
    }
}

impl TmdbSettings {
    /// Blanks out the metadata fields the user disabled.
    pub fn apply_field_toggles(&self, mut info: crate::data::MediaInfo) -> crate::data::MediaInfo {
        if !self.use_poster {
            info.poster = None;
        }
        if !self.use_fanart {
            info.fanart = None;
        }
        if !self.use_plot {
            info.plot.clear();
        }
        if !self.use_rating {
            info.rating = 0.0;
            info.votes = 0;
        }
        if !self.use_genres {
            info.genres.clear();
        }
        info
    }
}

/// Resolves a raw TTL-in-days setting string to a usable day count.
///
/// One clamping rule for every cache: a missing or unparseable value falls
/// back to `default_days`, a negative value clamps to 1, and 0 is kept as-is
/// (it means "never expire").
pub fn ttl_days_from_setting(raw: Option<&str>, default_days: u32) -> u32 {
    let raw = match raw {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => return default_days,
    };
    match raw.parse::<i64>() {
        Ok(days) if days < 0 => 1,
        Ok(days) => days.min(u32::MAX as i64) as u32,
        Err(_) => default_days,
    }
}
