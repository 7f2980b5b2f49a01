use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerSection;

/// Shared application state, wrapped in Arc for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config: ServerSection,
    pub photos_dir: PathBuf,
    pub start_time: std::time::Instant,

    /// Cancelled once on server shutdown; every in-flight relay observes it.
    pub shutdown: CancellationToken,

    /// Producer processes spawned and not yet reaped.
    pub live_producers: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerSection, shutdown: CancellationToken) -> Self {
        // Anchored to the startup working directory, but not canonicalised:
        // the root may not exist yet or may be swapped while serving.
        let configured_dir = PathBuf::from(&config.photos_dir);
        let photos_dir = std::path::absolute(&configured_dir).unwrap_or(configured_dir);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                photos_dir,
                start_time: std::time::Instant::now(),
                shutdown,
                live_producers: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Resolve an archive identifier to its source directory.
    ///
    /// Returns `None` unless the identifier is well formed and names an
    /// existing directory whose canonical path stays within the canonical
    /// root. The root is resolved on every call.
    pub fn archive_dir(&self, archive_hash: &str) -> Option<PathBuf> {
        if !is_valid_archive_hash(archive_hash) {
            return None;
        }
        let root = self.inner.photos_dir.canonicalize().ok()?;
        let canonical = root.join(archive_hash).canonicalize().ok()?;
        if !canonical.starts_with(&root) || canonical == root {
            return None;
        }
        if !canonical.is_dir() {
            return None;
        }
        Some(canonical)
    }

    pub fn live_producers(&self) -> usize {
        self.inner.live_producers.load(Ordering::Acquire)
    }
}

fn is_valid_archive_hash(archive_hash: &str) -> bool {
    !archive_hash.is_empty()
        && archive_hash.len() <= 128
        && archive_hash != "."
        && archive_hash != ".."
        && archive_hash
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}
