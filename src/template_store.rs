use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Where the landing-page template currently stands, surfaced on `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStatus {
    /// Loaded and the on-disk mtime matches what's cached.
    Loaded,
    /// Loaded once, but the most recent reload attempt failed (file removed,
    /// permission error, …). Callers still get the last-known-good bytes.
    Stale,
    /// Never successfully loaded.
    NeverLoaded,
}

impl TemplateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Loaded => "loaded",
            TemplateStatus::Stale => "stale",
            TemplateStatus::NeverLoaded => "never_loaded",
        }
    }
}

struct Loaded {
    bytes: Arc<Vec<u8>>,
    mtime: SystemTime,
}

/// Loads the static landing-page HTML template from disk once, then
/// watches its modification time and reloads on change.
///
/// Readers only ever observe a whole, previously-committed byte buffer —
/// a reload replaces the cached `Arc` wholesale rather than mutating bytes
/// in place, so no caller can see a torn slice mid-read.
pub struct TemplateStore {
    path: String,
    state: RwLock<Option<Loaded>>,
    degraded: std::sync::atomic::AtomicBool,
}

impl TemplateStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(None),
            degraded: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Return the current template bytes, reloading from disk if the file's
    /// mtime has changed since the last load. Returns `None` only if the
    /// file has never been successfully read even once.
    pub async fn get(&self) -> Option<Arc<Vec<u8>>> {
        let meta = tokio::fs::metadata(&self.path).await;

        let mtime = match &meta {
            Ok(m) => m.modified().ok(),
            Err(_) => None,
        };

        {
            let guard = self.state.read().await;
            if let Some(loaded) = guard.as_ref() {
                if meta.is_err() {
                    self.degraded.store(true, std::sync::atomic::Ordering::Relaxed);
                    return Some(loaded.bytes.clone());
                }
                if Some(loaded.mtime) == mtime {
                    return Some(loaded.bytes.clone());
                }
            }
        }

        // Either never loaded, or the mtime moved — reload under the
        // write lock so concurrent callers never race on the swap.
        let mut guard = self.state.write().await;

        // Another caller may have already reloaded while we waited.
        if let Some(loaded) = guard.as_ref() {
            if meta.is_ok() && Some(loaded.mtime) == mtime {
                return Some(loaded.bytes.clone());
            }
        }

        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let mtime = mtime.unwrap_or(SystemTime::now());
                let bytes = Arc::new(bytes);
                *guard = Some(Loaded {
                    bytes: bytes.clone(),
                    mtime,
                });
                self.degraded.store(false, std::sync::atomic::Ordering::Relaxed);
                Some(bytes)
            }
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "failed to (re)load landing-page template");
                self.degraded.store(true, std::sync::atomic::Ordering::Relaxed);
                guard.as_ref().map(|loaded| loaded.bytes.clone())
            }
        }
    }

    pub async fn status(&self) -> TemplateStatus {
        let guard = self.state.read().await;
        if guard.is_none() {
            return TemplateStatus::NeverLoaded;
        }
        if self.degraded.load(std::sync::atomic::Ordering::Relaxed) {
            TemplateStatus::Stale
        } else {
            TemplateStatus::Loaded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_and_reports_loaded() {
        let mut file = tempfile_with("<html>__META_TITLE__</html>");
        let store = TemplateStore::new(file.path_str());
        let bytes = store.get().await.unwrap();
        assert_eq!(&*bytes, b"<html>__META_TITLE__</html>");
        assert_eq!(store.status().await, TemplateStatus::Loaded);
        file.close();
    }

    #[tokio::test]
    async fn never_loaded_returns_none() {
        let store = TemplateStore::new("/nonexistent/path/does-not-exist.html");
        assert!(store.get().await.is_none());
        assert_eq!(store.status().await, TemplateStatus::NeverLoaded);
    }

    #[tokio::test]
    async fn serves_stale_bytes_after_removal() {
        let mut file = tempfile_with("hello");
        let store = TemplateStore::new(file.path_str());
        assert!(store.get().await.is_some());
        file.close();
        let bytes = store.get().await.unwrap();
        assert_eq!(&*bytes, b"hello");
        assert_eq!(store.status().await, TemplateStatus::Stale);
    }

    struct TempFile {
        path: std::path::PathBuf,
    }

    impl TempFile {
        fn path_str(&self) -> String {
            self.path.to_string_lossy().into_owned()
        }

        fn close(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn tempfile_with(contents: &str) -> TempFile {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "template_store_test_{}_{}.html",
            std::process::id(),
            contents.len()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        TempFile { path }
    }
}
