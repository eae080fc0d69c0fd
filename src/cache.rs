use crate::models::Link;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe in-memory read-through cache mapping slug -> Link.
///
/// Backed by a DashMap so reads are concurrent and lock-free for most cases.
/// The Link Store warms this at startup with every active link, then keeps
/// it in sync via explicit `set`/`remove` calls after every write.
#[derive(Clone, Debug)]
pub struct LinkCache {
    inner: Arc<DashMap<String, Arc<Link>>>,
}

impl LinkCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Insert or update a mapping.
    pub fn set(&self, slug: impl Into<String>, link: Link) {
        self.inner.insert(slug.into(), Arc::new(link));
    }

    /// Look up a slug. Returns a cheap `Arc` clone of the cached link.
    pub fn get(&self, slug: &str) -> Option<Arc<Link>> {
        self.inner.get(slug).map(|v| v.clone())
    }

    /// Remove a mapping (e.g. when a link is deleted or deactivated).
    pub fn remove(&self, slug: &str) {
        self.inner.remove(slug);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for LinkCache {
    fn default() -> Self {
        Self::new()
    }
}
