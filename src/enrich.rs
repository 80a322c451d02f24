//! Listing refresh and metadata enrichment pipeline
//!
//! Ties the pieces together for one refresh pass: reconcile the portal
//! identity (which may wipe the listing cache), read categories and videos
//! through the cache with a network fetch on miss, enrich each video through
//! the TMDB client, and flush the TMDB cache once at the end of the batch.
//!
//! Also provides the background staleness probe: a scheduled task with an
//! explicit shutdown channel that reports stale listings over an mpsc
//! channel so the host can trigger a silent refresh.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{portal, CategoryVideoCache};
use crate::config::{Settings, TmdbSettings};
use crate::data::{Category, ListingKind, MediaInfo, MediaKind, TmdbClient, Video};

/// Errors a portal backend may produce; the pipeline only logs them.
pub type PortalError = Box<dyn std::error::Error + Send + Sync>;

/// The portal protocol client, supplied by the collaborator. The core only
/// caches its output.
#[async_trait]
pub trait PortalSource {
    async fn fetch_categories(&self, kind: ListingKind) -> Result<Vec<Category>, PortalError>;
    async fn fetch_videos(
        &self,
        kind: ListingKind,
        category_id: &str,
    ) -> Result<Vec<Video>, PortalError>;
}

/// A portal video paired with whatever metadata enrichment produced for it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedVideo {
    pub video: Video,
    pub info: Option<MediaInfo>,
}

/// What one refresh pass did, for the host's user notices.
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    /// The portal identity changed and the listing cache was wiped;
    /// the host shows its one-time notice
    pub portal_changed: bool,
    pub categories: usize,
    pub videos: usize,
    pub enriched: usize,
    /// The TMDB client hit its abort threshold during this pass; the host
    /// informs the user that metadata is incomplete
    pub aborted: bool,
}

/// One listing refresh/enrichment flow over a single cache root. Callers
/// serialize access: one pass at a time per storage directory.
pub struct Enricher {
    storage_dir: PathBuf,
    server_address: String,
    mac_address: String,
    listing: CategoryVideoCache,
    tmdb: Option<TmdbClient>,
    tmdb_settings: TmdbSettings,
}

impl Enricher {
    pub fn new(settings: &Settings) -> Self {
        let listing = CategoryVideoCache::new(&settings.storage_dir, settings.listing_cache_days);
        let tmdb = if settings.tmdb.enabled && !settings.tmdb.api_key.is_empty() {
            Some(TmdbClient::new(
                &settings.storage_dir,
                settings.tmdb.api_key.clone(),
                settings.tmdb.language.clone(),
                settings.tmdb.cache_days,
            ))
        } else {
            None
        };
        Self {
            storage_dir: settings.storage_dir.clone(),
            server_address: settings.server_address.clone(),
            mac_address: settings.mac_address.clone(),
            listing,
            tmdb,
            tmdb_settings: settings.tmdb.clone(),
        }
    }

    /// The listing cache this pass reads and writes.
    pub fn listing_cache(&self) -> &CategoryVideoCache {
        &self.listing
    }

    /// Runs one full refresh pass for a listing kind.
    ///
    /// Network fetches go through `source` only on cache misses. A rate-limit
    /// abort stops further lookups but the pass still completes and reports
    /// `aborted` in the summary.
    pub async fn refresh_listing<S: PortalSource + Sync>(
        &mut self,
        source: &S,
        kind: ListingKind,
    ) -> RefreshSummary {
        let mut summary = RefreshSummary {
            portal_changed: portal::reconcile(
                &self.storage_dir,
                &self.server_address,
                &self.mac_address,
            ),
            ..RefreshSummary::default()
        };

        let Some(categories) = self.categories(source, kind).await else {
            return summary;
        };
        summary.categories = categories.len();

        for category in &categories {
            let Some(videos) = self.videos(source, kind, &category.id).await else {
                continue;
            };
            summary.videos += videos.len();
            let enriched = self.enrich(kind, &videos).await;
            summary.enriched += enriched.iter().filter(|v| v.info.is_some()).count();
            if self.tmdb.as_ref().is_some_and(|t| t.is_aborted()) {
                summary.aborted = true;
                break;
            }
        }

        if let Some(tmdb) = &self.tmdb {
            tmdb.flush();
        }
        info!(
            kind = %kind,
            categories = summary.categories,
            videos = summary.videos,
            enriched = summary.enriched,
            aborted = summary.aborted,
            "listing refresh finished"
        );
        summary
    }

    /// Returns the category list for a kind, fetching and caching it on a
    /// miss. `None` when both the cache and the portal come up empty.
    pub async fn categories<S: PortalSource + Sync>(
        &self,
        source: &S,
        kind: ListingKind,
    ) -> Option<Vec<Category>> {
        if let Some(cached) = self.listing.get_categories(kind) {
            debug!(kind = %kind, "category cache hit");
            return Some(cached);
        }
        match source.fetch_categories(kind).await {
            Ok(categories) => {
                self.listing.set_categories(kind, &categories);
                Some(categories)
            }
            Err(err) => {
                warn!(kind = %kind, error = %err, "category fetch failed");
                None
            }
        }
    }

    /// Returns the video list for a category, fetching and caching it on a
    /// miss.
    pub async fn videos<S: PortalSource + Sync>(
        &self,
        source: &S,
        kind: ListingKind,
        category_id: &str,
    ) -> Option<Vec<Video>> {
        if let Some(cached) = self.listing.get_videos(kind, category_id) {
            return Some(cached);
        }
        match source.fetch_videos(kind, category_id).await {
            Ok(videos) => {
                self.listing.set_videos(kind, category_id, &videos);
                Some(videos)
            }
            Err(err) => {
                warn!(kind = %kind, category_id, error = %err, "video fetch failed");
                None
            }
        }
    }

    /// Enriches a batch of videos with TMDB metadata. Live-TV listings and
    /// disabled enrichment pass through unchanged. Stops issuing lookups as
    /// soon as the client aborts; earlier results are kept.
    pub async fn enrich(&mut self, kind: ListingKind, videos: &[Video]) -> Vec<EnrichedVideo> {
        let Some(media_kind) = kind.media_kind() else {
            return passthrough(videos);
        };
        let Some(tmdb) = self.tmdb.as_mut() else {
            return passthrough(videos);
        };

        let mut enriched = Vec::with_capacity(videos.len());
        for video in videos {
            if tmdb.is_aborted() {
                enriched.push(EnrichedVideo {
                    video: video.clone(),
                    info: None,
                });
                continue;
            }
            let lookup = match media_kind {
                MediaKind::Movie => tmdb.lookup_movie(&video.name, video.year).await,
                MediaKind::Tv => tmdb.lookup_series(&video.name, video.year).await,
            };
            let info = match lookup {
                Ok(info) => info.map(|i| self.tmdb_settings.apply_field_toggles(i)),
                Err(err) => {
                    // Surfaced once, at the abort transition; remaining
                    // videos pass through unenriched.
                    warn!(error = %err, "stopping enrichment batch");
                    None
                }
            };
            enriched.push(EnrichedVideo {
                video: video.clone(),
                info,
            });
        }
        enriched
    }
}

fn passthrough(videos: &[Video]) -> Vec<EnrichedVideo> {
    videos
        .iter()
        .map(|video| EnrichedVideo {
            video: video.clone(),
            info: None,
        })
        .collect()
}

/// Messages sent from the staleness probe to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMessage {
    /// The category cache for this kind is missing or past its TTL; a
    /// silent background refresh is due
    ListingStale(ListingKind),
}

/// Configuration for the background staleness probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// How often to re-check the cache files
    pub interval: Duration,
    /// Which listing kinds to watch
    pub kinds: Vec<ListingKind>,
    /// Whether the probe runs at all
    pub enabled: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            kinds: vec![ListingKind::Vod, ListingKind::Series],
            enabled: true,
        }
    }
}

/// Handle for the background staleness probe task.
pub struct ProbeHandle {
    /// Channel delivering staleness notifications
    pub receiver: mpsc::Receiver<ProbeMessage>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ProbeHandle {
    /// Spawns the probe task. The first check runs after one interval, not
    /// immediately, so startup refreshes stay with the host.
    pub fn spawn(cache: CategoryVideoCache, config: ProbeConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(8);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            for kind in &config.kinds {
                                if cache.categories_are_stale(*kind) {
                                    debug!(kind = %kind, "listing cache stale");
                                    if msg_tx.send(ProbeMessage::ListingStale(*kind)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Stops the probe task deterministically.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
