//! Process-lifetime memoization of resolved link previews.
//!
//! A repeatedly shared URL is scraped and uploaded once; every later publish
//! of the same URL reuses the stored resolution. The cache is disposable
//! state and needs no teardown.

use crate::traits::PreviewResolver;
use crier_model::LinkPreview;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

/// Memoizing front of the preview resolver.
///
/// Concurrent calls for one unresolved URL share a single in-flight
/// resolution. A failed resolution is not cached: the next call for the same
/// URL retries.
pub struct PreviewCache {
    resolver: Arc<dyn PreviewResolver>,
    entries: DashMap<String, Arc<OnceCell<LinkPreview>>>,
}

impl PreviewCache {
    /// Create a cache over a resolver.
    #[must_use]
    pub fn new(resolver: Arc<dyn PreviewResolver>) -> Self {
        Self {
            resolver,
            entries: DashMap::new(),
        }
    }

    /// Resolve a URL, reusing any previous successful resolution.
    ///
    /// Returns `None` when resolution fails; the failure is logged and the
    /// URL stays retryable.
    pub async fn resolve(&self, url: &str) -> Option<LinkPreview> {
        let cell = self
            .entries
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        match cell
            .get_or_try_init(|| self.resolver.resolve(url))
            .await
        {
            Ok(preview) => Some(preview.clone()),
            Err(e) => {
                warn!(url = %url, error = %e, "preview resolution failed");
                None
            }
        }
    }

    /// Number of successfully resolved URLs held by the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.initialized()).count()
    }

    /// Whether the cache holds no resolutions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
