use crate::{cache::LinkCache, db, models::Link, models::ClickRecord};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Read-through Link store: cache-first lookups, database-backed writes.
/// The only component that reads or writes the `links` table.
#[derive(Clone)]
pub struct LinkStore {
    pool: SqlitePool,
    cache: LinkCache,
}

impl LinkStore {
    pub fn new(pool: SqlitePool, cache: LinkCache) -> Self {
        Self { pool, cache }
    }

    /// Look up a link by slug. The slug is lower-cased before lookup.
    /// A non-existent slug returns `None`, never an error.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Arc<Link>>, sqlx::Error> {
        let slug = slug.to_lowercase();

        if let Some(link) = self.cache.get(&slug) {
            return Ok(Some(link));
        }

        match db::get_link_by_slug(&self.pool, &slug).await? {
            Some(link) => {
                self.cache.set(slug, link.clone());
                Ok(Some(Arc::new(link)))
            }
            None => Ok(None),
        }
    }

    /// Append a click-log row and atomically bump the owning link's
    /// counters. Invalidates the cached entry so the next lookup reflects
    /// the new counts (the cache holds the `Link` record used for meta
    /// rendering, not just a slug->url mapping, so counters are part of it).
    pub async fn record_click(&self, link_id: i64, record: &ClickRecord) -> Result<(), sqlx::Error> {
        db::record_click(&self.pool, link_id, record).await?;
        self.cache.remove(&record.slug);
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn cache(&self) -> &LinkCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive_and_caches() {
        let pool = test_pool().await;
        db::create_link(&pool, "flash50", "https://shopee.vn/x", Some("Flash Sale"), None, None, None)
            .await
            .unwrap();

        let store = LinkStore::new(pool, LinkCache::new());
        let link = store.get_by_slug("FLASH50").await.unwrap().unwrap();
        assert_eq!(link.slug, "flash50");
        assert_eq!(link.target_url, "https://shopee.vn/x");

        // Second lookup should be served from cache.
        let cached = store.get_by_slug("flash50").await.unwrap().unwrap();
        assert_eq!(cached.id, link.id);
    }

    #[tokio::test]
    async fn unknown_slug_returns_none() {
        let pool = test_pool().await;
        let store = LinkStore::new(pool, LinkCache::new());
        assert!(store.get_by_slug("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_click_updates_counters_and_log() {
        let pool = test_pool().await;
        let link = db::create_link(&pool, "flash50", "https://shopee.vn/x", None, None, None, None)
            .await
            .unwrap();

        let store = LinkStore::new(pool.clone(), LinkCache::new());
        store
            .record_click(
                link.id,
                &ClickRecord {
                    slug: "flash50".into(),
                    ip: Some("1.2.3.4".into()),
                    user_agent: Some("Mozilla".into()),
                    referer: None,
                    device: "desktop".into(),
                    valid: true,
                    invalid_reason: None,
                },
            )
            .await
            .unwrap();

        let reloaded = db::get_link_by_id(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_clicks, 1);
        assert_eq!(reloaded.valid_clicks, 1);
    }
}
