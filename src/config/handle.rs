//! Global config with lock-free reads.
//!
//! Uses `arc-swap` so the serving loop and per-request tasks can read the
//! config without locking. The config is loaded once at startup; only the
//! site manifest (see `manifest::handle`) is hot-reloaded.

use super::SiteConfig;
use arc_swap::ArcSwap;
use std::sync::{Arc, LazyLock};

/// Global config storage.
///
/// Initialized with default config, then replaced with the loaded config
/// in main before anything reads it.
static CONFIG: LazyLock<ArcSwap<SiteConfig>> =
    LazyLock::new(|| ArcSwap::from_pointee(SiteConfig::default()));

/// Get current config as `Arc<SiteConfig>`.
///
/// Returns an `Arc` that keeps the config alive. Thread-safe and wait-free.
/// The Arc auto-derefs to `&SiteConfig`:
///
/// ```ignore
/// let c = cfg();
/// let port = c.serve.port;
/// ```
#[inline]
pub fn cfg() -> Arc<SiteConfig> {
    CONFIG.load_full()
}

/// Initialize global config (called once at startup).
#[inline]
pub fn init_config(config: SiteConfig) {
    CONFIG.store(Arc::new(config));
}
