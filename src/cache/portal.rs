//! Portal identity tracking and cache invalidation
//!
//! The listing cache and the folder filter selections only make sense for
//! one portal. When the configured server address or device MAC changes, the
//! portal-scoped files are deleted wholesale. The TMDB cache is keyed by
//! title text, not by portal, so it survives a portal switch.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::store;

const IDENTITY_FILE: &str = "last_portal.json";

/// File-name prefixes of everything that is scoped to one portal.
const PORTAL_SCOPED_PREFIXES: [&str; 3] = ["stalker_cats_", "stalker_videos_", "folder_filter_"];

/// The persisted portal identity. Equality is exact string match on both
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PortalIdentity {
    server: String,
    mac: String,
}

/// Compares the current portal identity against the persisted one and wipes
/// the portal-scoped cache on a mismatch.
///
/// Returns `true` only when a previously stored identity differed and the
/// cache was cleared. A first-ever run stores the identity and returns
/// `false`: there is no cache to wipe yet. Calling this twice in a row with
/// unchanged settings is a no-op after the first call.
pub fn reconcile(storage_root: &Path, server_address: &str, device_mac: &str) -> bool {
    let current = PortalIdentity {
        server: server_address.to_string(),
        mac: device_mac.to_string(),
    };

    // Identity never expires; only its presence matters.
    let previous: Option<PortalIdentity> =
        store::read(&storage_root.join(IDENTITY_FILE), Duration::zero());

    match previous {
        Some(previous) if previous == current => false,
        Some(previous) => {
            info!(
                old_server = %previous.server,
                new_server = %current.server,
                "portal identity changed, clearing portal-scoped cache"
            );
            clear_portal_scoped_files(storage_root);
            persist(storage_root, &current);
            true
        }
        None => {
            persist(storage_root, &current);
            false
        }
    }
}

/// Deletes every portal-scoped cache file under the storage root.
///
/// Also used by the CLI `clear` command. Unrelated files, in particular
/// `tmdb_cache.json`, are left alone.
pub fn clear_portal_scoped_files(storage_root: &Path) {
    let entries = match fs::read_dir(storage_root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %storage_root.display(), error = %err, "cannot scan storage root");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".json") {
            continue;
        }
        if PORTAL_SCOPED_PREFIXES.iter().any(|p| name.starts_with(p)) {
            if let Err(err) = fs::remove_file(entry.path()) {
                warn!(file = name, error = %err, "failed to delete cache file");
            }
        }
    }
}

fn persist(storage_root: &Path, identity: &PortalIdentity) {
    let path = storage_root.join(IDENTITY_FILE);
    if let Err(err) = store::write(&path, identity) {
        warn!(path = %path.display(), error = %err, "portal identity write failed");
    }
}
