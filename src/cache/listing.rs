//! Local disk cache for portal category and video lists
//!
//! One JSON file per entry under the storage root:
//!   `stalker_cats_<kind>.json`         - category list for one listing kind
//!   `stalker_videos_<kind>_<id>.json`  - all videos for one category
//!
//! Each file holds a `{"ts": <epoch seconds>, "data": [...]}` record. A write
//! failure is logged and swallowed: losing a cache write costs a refetch, not
//! correctness.

use chrono::Duration;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::store;
use crate::data::{Category, ListingKind, Video};

/// Read/write access to the cached category and video lists, with a TTL
/// fixed at construction (in days, 0 = never expire).
#[derive(Debug, Clone)]
pub struct CategoryVideoCache {
    dir: PathBuf,
    ttl: Duration,
}

impl CategoryVideoCache {
    pub fn new(dir: impl Into<PathBuf>, ttl_days: u32) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::days(ttl_days as i64),
        }
    }

    /// Returns the cached category list, or `None` if missing or stale.
    pub fn get_categories(&self, kind: ListingKind) -> Option<Vec<Category>> {
        store::read(&cats_path(&self.dir, kind), self.ttl)
    }

    /// Persists the category list for a listing kind.
    pub fn set_categories(&self, kind: ListingKind, categories: &[Category]) {
        let path = cats_path(&self.dir, kind);
        if let Err(err) = store::write(&path, &categories) {
            warn!(path = %path.display(), error = %err, "category cache write failed");
        }
    }

    /// True if the category cache file is missing or older than the TTL.
    /// Cheap probe: does not deserialize the list.
    pub fn categories_are_stale(&self, kind: ListingKind) -> bool {
        store::is_stale(&cats_path(&self.dir, kind), self.ttl)
    }

    /// Returns the cached video list for a category, or `None` if missing
    /// or stale.
    pub fn get_videos(&self, kind: ListingKind, category_id: &str) -> Option<Vec<Video>> {
        store::read(&videos_path(&self.dir, kind, category_id), self.ttl)
    }

    /// Persists the video list for a category.
    pub fn set_videos(&self, kind: ListingKind, category_id: &str, videos: &[Video]) {
        let path = videos_path(&self.dir, kind, category_id);
        if let Err(err) = store::write(&path, &videos) {
            warn!(path = %path.display(), error = %err, "video cache write failed");
        }
    }
}

fn cats_path(dir: &Path, kind: ListingKind) -> PathBuf {
    dir.join(format!("stalker_cats_{}.json", kind.as_str()))
}

fn videos_path(dir: &Path, kind: ListingKind, category_id: &str) -> PathBuf {
    dir.join(format!("stalker_videos_{}_{}.json", kind.as_str(), category_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::tests::backdate_record;
    use tempfile::TempDir;

    fn create_test_cache() -> (CategoryVideoCache, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = CategoryVideoCache::new(temp_dir.path(), 1);
        (cache, temp_dir)
    }

    fn sample_categories() -> Vec<Category> {
        vec![
            Category {
                id: "1".to_string(),
                title: "Action".to_string(),
            },
            Category {
                id: "2".to_string(),
                title: "Drama".to_string(),
            },
        ]
    }

    fn sample_videos() -> Vec<Video> {
        vec![Video {
            id: "101".to_string(),
            name: "Inception".to_string(),
            year: Some(2010),
            description: String::new(),
            screenshot_uri: None,
        }]
    }

    #[test]
    fn test_categories_roundtrip() {
        let (cache, _temp_dir) = create_test_cache();

        assert!(cache.get_categories(ListingKind::Vod).is_none());
        cache.set_categories(ListingKind::Vod, &sample_categories());

        assert_eq!(
            cache.get_categories(ListingKind::Vod),
            Some(sample_categories())
        );
    }

    #[test]
    fn test_listing_kinds_do_not_collide() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set_categories(ListingKind::Vod, &sample_categories());

        assert!(cache.get_categories(ListingKind::Series).is_none());
        assert!(cache.get_categories(ListingKind::Tv).is_none());
    }

    #[test]
    fn test_videos_are_keyed_per_category() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set_videos(ListingKind::Vod, "1", &sample_videos());

        assert_eq!(
            cache.get_videos(ListingKind::Vod, "1"),
            Some(sample_videos())
        );
        assert!(cache.get_videos(ListingKind::Vod, "2").is_none());
        assert!(cache.get_videos(ListingKind::Series, "1").is_none());
    }

    #[test]
    fn test_fresh_categories_are_not_stale() {
        let (cache, _temp_dir) = create_test_cache();

        assert!(cache.categories_are_stale(ListingKind::Vod), "missing file is stale");
        cache.set_categories(ListingKind::Vod, &sample_categories());
        assert!(!cache.categories_are_stale(ListingKind::Vod));
    }

    #[test]
    fn test_categories_expire_after_ttl() {
        let (cache, temp_dir) = create_test_cache();

        cache.set_categories(ListingKind::Vod, &sample_categories());
        backdate_record(&temp_dir.path().join("stalker_cats_vod.json"), 2);

        assert!(cache.categories_are_stale(ListingKind::Vod));
        assert!(cache.get_categories(ListingKind::Vod).is_none());
    }

    #[test]
    fn test_zero_ttl_keeps_old_records_readable() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CategoryVideoCache::new(temp_dir.path(), 0);

        cache.set_categories(ListingKind::Vod, &sample_categories());
        backdate_record(&temp_dir.path().join("stalker_cats_vod.json"), 365);

        assert!(!cache.categories_are_stale(ListingKind::Vod));
        assert_eq!(
            cache.get_categories(ListingKind::Vod),
            Some(sample_categories())
        );
    }

    #[test]
    fn test_expected_file_names_on_disk() {
        let (cache, temp_dir) = create_test_cache();

        cache.set_categories(ListingKind::Series, &sample_categories());
        cache.set_videos(ListingKind::Series, "42", &sample_videos());

        assert!(temp_dir.path().join("stalker_cats_series.json").exists());
        assert!(temp_dir.path().join("stalker_videos_series_42.json").exists());
    }
}
