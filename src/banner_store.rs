use crate::{
    db,
    models::{Banner, BannerContext, DeviceConstraint},
};
use rand::Rng;
use sqlx::SqlitePool;

/// Banner selection and click/impression bookkeeping.
#[derive(Clone)]
pub struct BannerStore {
    pool: SqlitePool,
}

impl BannerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Pick one banner eligible for `ctx`, weighted-random among ties.
    ///
    /// Eligible banners are sorted by `priority` ascending (lower priority
    /// number wins ties) then by `weight` descending, a single
    /// `rand::Rng::gen_range(0..total_weight)` draw selects a position, and
    /// a running-subtotal scan over the sorted list picks the banner whose
    /// cumulative weight range contains the draw. If every eligible banner
    /// has `weight == 0`, the draw range is empty and the first banner after
    /// sorting is returned. An empty eligible set returns `None`.
    pub async fn select(&self, ctx: &BannerContext) -> Result<Option<Banner>, sqlx::Error> {
        let candidates = db::list_active_banners(&self.pool, ctx.kind.as_str()).await?;

        let mut eligible: Vec<Banner> = candidates
            .into_iter()
            .filter(|b| is_eligible(b, ctx))
            .collect();

        if eligible.is_empty() {
            return Ok(None);
        }

        eligible.sort_by(|a, b| a.priority.cmp(&b.priority).then(b.weight.cmp(&a.weight)));

        let total_weight: i64 = eligible.iter().map(|b| b.weight.max(0)).sum();

        if total_weight <= 0 {
            return Ok(eligible.into_iter().next());
        }

        let draw = rand::thread_rng().gen_range(0..total_weight);
        let mut running = 0i64;
        for banner in eligible {
            running += banner.weight.max(0);
            if draw < running {
                return Ok(Some(banner));
            }
        }

        unreachable!("draw is always < total_weight, so the scan always returns inside the loop")
    }

    pub async fn record_impression(&self, id: i64) -> Result<bool, sqlx::Error> {
        db::record_banner_impression(&self.pool, id).await
    }

    pub async fn record_click(&self, id: i64, ip: &str) -> Result<bool, sqlx::Error> {
        db::record_banner_click(&self.pool, id, ip).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Banner>, sqlx::Error> {
        db::get_banner_by_id(&self.pool, id).await
    }
}

fn is_eligible(banner: &Banner, ctx: &BannerContext) -> bool {
    if !DeviceConstraint::parse(&banner.device_constraint).matches(&ctx.device) {
        return false;
    }

    let articles = banner.target_article_set();
    if !articles.is_empty() {
        match &ctx.article_slug {
            Some(slug) if articles.contains(&slug.as_str()) => {}
            _ => return false,
        }
    }

    let categories = banner.target_category_set();
    if !categories.is_empty() {
        match &ctx.category {
            Some(cat) if categories.contains(&cat.as_str()) => {}
            _ => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BannerKind;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn ctx() -> BannerContext {
        BannerContext {
            kind: BannerKind::StickyBottom,
            device: "desktop".to_owned(),
            article_slug: None,
            category: None,
        }
    }

    #[tokio::test]
    async fn empty_candidate_set_returns_none() {
        let pool = test_pool().await;
        let store = BannerStore::new(pool);
        assert!(store.select(&ctx()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_weight_ties_return_first_after_sort() {
        let pool = test_pool().await;
        db::create_banner(&pool, "a", "https://img/a.png", "sticky_bottom", None, None, 0, 5)
            .await
            .unwrap();
        db::create_banner(&pool, "b", "https://img/b.png", "sticky_bottom", None, None, 0, 1)
            .await
            .unwrap();

        let store = BannerStore::new(pool);
        let picked = store.select(&ctx()).await.unwrap().unwrap();
        assert_eq!(picked.name, "b"); // lower priority number sorts first
    }

    #[tokio::test]
    async fn device_targeting_excludes_mismatched_requests() {
        let pool = test_pool().await;
        let b = db::create_banner(&pool, "mobile-only", "https://img/a.png", "sticky_bottom", None, None, 10, 1)
            .await
            .unwrap();
        sqlx::query("UPDATE banners SET device_constraint = 'mobile' WHERE id = ?1")
            .bind(b.id)
            .execute(&pool)
            .await
            .unwrap();

        let store = BannerStore::new(pool);
        assert!(store.select(&ctx()).await.unwrap().is_none());

        let mobile_ctx = BannerContext {
            device: "mobile".to_owned(),
            ..ctx()
        };
        assert!(store.select(&mobile_ctx).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn weighted_draw_stays_within_bounds_over_many_trials() {
        let pool = test_pool().await;
        db::create_banner(&pool, "heavy", "https://img/a.png", "sticky_bottom", None, None, 90, 1)
            .await
            .unwrap();
        db::create_banner(&pool, "light", "https://img/b.png", "sticky_bottom", None, None, 10, 1)
            .await
            .unwrap();

        let store = BannerStore::new(pool);
        let mut heavy_count = 0;
        for _ in 0..2000 {
            if store.select(&ctx()).await.unwrap().unwrap().name == "heavy" {
                heavy_count += 1;
            }
        }
        // Expect roughly 90%, allow generous slack for a fixed-seed-free RNG.
        assert!(heavy_count > 1600, "heavy picked {heavy_count}/2000 times");
    }
}
