//! Global manifest with atomic reload support.
//!
//! Uses `arc-swap` for lock-free reads and atomic manifest replacement.
//! In-flight requests hold their own `Arc<Site>` snapshot, so a reload
//! never exposes a partially-updated manifest.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SITE (ArcSwap)                         │
//! │                                                             │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐    │
//! │  │  Request 1  │     │  Request 2  │     │   Watcher   │    │
//! │  │   (task)    │     │   (task)    │     │  (thread)   │    │
//! │  └──────┬──────┘     └──────┬──────┘     └──────┬──────┘    │
//! │         │                   │                   │           │
//! │         ▼                   ▼                   ▼           │
//! │       site()             site()           reload_site()     │
//! │    (lock-free)         (lock-free)      (atomic replace)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use super::Site;
use crate::config::cfg;
use std::sync::{
    Arc, LazyLock,
    atomic::{AtomicU64, Ordering},
};

// =============================================================================
// Global State
// =============================================================================

/// Global manifest storage with atomic replacement support.
///
/// Initialized with an empty site, then replaced with the loaded manifest
/// in main. During watch mode, replaced atomically when site.yaml changes.
static SITE: LazyLock<arc_swap::ArcSwap<Site>> =
    LazyLock::new(|| arc_swap::ArcSwap::from_pointee(Site::default()));

/// Hash of the manifest content at last load.
static SITE_HASH: AtomicU64 = AtomicU64::new(0);

/// Truncated blake3 of the manifest text, enough for change detection.
fn content_hash(bytes: &[u8]) -> u64 {
    let hash = blake3::hash(bytes);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

// =============================================================================
// Public API
// =============================================================================

/// Get the current manifest snapshot as `Arc<Site>`.
///
/// Thread-safe and wait-free; the returned Arc stays valid across a
/// concurrent reload.
#[inline]
pub fn site() -> Arc<Site> {
    SITE.load_full()
}

/// Initialize the global manifest (called once at startup).
pub fn init_site(site: Site) {
    let c = cfg();
    if let Ok(content) = std::fs::read(&c.paths.manifest) {
        SITE_HASH.store(content_hash(&content), Ordering::Relaxed);
    }
    SITE.store(Arc::new(site));
}

/// Replace the manifest atomically (called when site.yaml changes).
///
/// Returns `true` if the manifest was actually updated, `false` if the
/// content matches the last load. A parse failure leaves the previous
/// manifest in place and bubbles the error up to the watcher, which logs
/// it; reload failures are never fatal.
pub fn reload_site() -> anyhow::Result<bool> {
    let c = cfg();

    let content = std::fs::read_to_string(&c.paths.manifest)?;

    let new_hash = content_hash(content.as_bytes());
    let old_hash = SITE_HASH.load(Ordering::Relaxed);
    if new_hash == old_hash {
        return Ok(false);
    }

    let new_site = Site::from_str(&content)?;

    SITE.store(Arc::new(new_site));
    SITE_HASH.store(new_hash, Ordering::Relaxed);

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        let a = content_hash(b"pages: {}");
        let b = content_hash(b"pages: {}");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_hash_differs() {
        let a = content_hash(b"pages: {}");
        let b = content_hash(b"pages: {}\ntitle: x");
        assert_ne!(a, b);
    }

    #[test]
    fn test_site_swap_visible_to_new_readers() {
        let mut updated = Site::default();
        updated.meta.insert(
            "title".to_string(),
            serde_json::Value::String("swapped".into()),
        );

        let before = site();
        SITE.store(Arc::new(updated));
        let after = site();

        // the pre-swap snapshot is still alive and unchanged
        assert!(Arc::strong_count(&before) >= 1);
        assert_eq!(
            after.meta.get("title").and_then(|v| v.as_str()),
            Some("swapped")
        );
    }
}
