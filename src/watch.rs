//! Manifest file watcher for hot reload.
//!
//! Monitors `site.yaml` for changes and swaps the global manifest
//! atomically when it changes. Requests already in flight keep their
//! snapshot; only new requests see the reloaded routes.
//!
//! A reload that fails to parse is logged and the previous manifest
//! stays live, so an editor typo never takes the site down.

use crate::{log, config::cfg, manifest::reload_site};
use anyhow::{Context, Result};
use std::{
    path::Path,
    time::{Duration, Instant},
};
use notify::{Event, EventKind, RecursiveMode, Watcher};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Whether an event plausibly touched the manifest file.
///
/// Editors save via rename-replace, so matching the exact path is not
/// enough; any non-temp event in the manifest's directory counts and the
/// content hash inside `reload_site` filters out false positives.
fn touches_manifest(event: &Event, manifest: &Path) -> bool {
    event.paths.iter().any(|p| {
        if is_temp_file(p) {
            return false;
        }
        p == manifest || p.parent() == manifest.parent()
    })
}

const fn is_relevant(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events before triggering a reload.
struct Debouncer {
    pending: bool,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: false,
            last_event: None,
        }
    }

    fn mark(&mut self) {
        self.pending = true;
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        self.pending
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) {
        self.pending = false;
        self.last_event = None;
    }

    fn timeout(&self) -> Duration {
        if self.pending {
            Duration::from_millis(DEBOUNCE_MS)
        } else {
            Duration::from_secs(60)
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking manifest watcher with debouncing and hot reload.
pub fn watch_manifest_blocking() -> Result<()> {
    let c = cfg();
    let manifest = c.paths.manifest.clone();
    let watch_dir = manifest
        .parent()
        .context("manifest path has no parent directory")?;

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

    log!("watch"; "watching {}", manifest.display());

    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) && touches_manifest(&event, &manifest) => {
                debouncer.mark();
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                debouncer.take();
                match reload_site() {
                    Ok(true) => log!("watch"; "manifest reloaded"),
                    Ok(false) => {} // content unchanged
                    Err(e) => log!("watch"; "reload failed, keeping previous manifest: {e:#}"),
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            // Other cases: irrelevant events, timeout without ready, etc.
            _ => {}
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("site.yaml.swp")));
        assert!(is_temp_file(Path::new("site.yaml~")));
        assert!(is_temp_file(Path::new(".site.yaml.kate-swp")));

        assert!(!is_temp_file(Path::new("site.yaml")));
    }

    #[test]
    fn test_touches_manifest_sibling_counts() {
        let manifest = PathBuf::from("/proj/site.yaml");

        // rename-replace intermediate in the same dir, non-temp name
        let sibling = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/proj/other.yaml"));
        assert!(touches_manifest(&sibling, &manifest));

        // editor swap file is filtered
        let swap = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/proj/site.yaml.swp"));
        assert!(!touches_manifest(&swap, &manifest));

        // unrelated directory is ignored
        let elsewhere = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/elsewhere/site.yaml"));
        assert!(!touches_manifest(&elsewhere, &manifest));
    }

    #[test]
    fn test_debouncer_not_ready_immediately() {
        let mut d = Debouncer::new();
        assert!(!d.ready());

        d.mark();
        // just marked, still inside the debounce window
        assert!(!d.ready());
        assert_eq!(d.timeout(), Duration::from_millis(DEBOUNCE_MS));
    }
}
