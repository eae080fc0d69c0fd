use crate::{
    cache::LinkCache,
    models::{AnalyticsSummary, Banner, ClickLog, ClickRecord, Link, LinkWithStats},
};
use chrono::Utc;
use sqlx::SqlitePool;

// ── Warm-up ────────────────────────────────────────────────────────────────

/// Load every active link into the in-memory cache at startup.
pub async fn warm_cache(pool: &SqlitePool, cache: &LinkCache) -> anyhow::Result<()> {
    let links: Vec<Link> = sqlx::query_as(
        "SELECT id, slug, title, description, image_url, author, published_at,
                target_url, active, expires_at, total_clicks, valid_clicks, created_at
         FROM links WHERE active = 1",
    )
    .fetch_all(pool)
    .await?;

    let count = links.len();
    for link in links {
        cache.set(link.slug.clone(), link);
    }

    tracing::info!("Cache warmed with {} active link(s)", count);
    Ok(())
}

// ── Links ──────────────────────────────────────────────────────────────────

/// Insert a new link and return the newly created row.
#[allow(clippy::too_many_arguments)]
pub async fn create_link(
    pool: &SqlitePool,
    slug: &str,
    target_url: &str,
    title: Option<&str>,
    description: Option<&str>,
    image_url: Option<&str>,
    author: Option<&str>,
) -> Result<Link, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO links (slug, target_url, title, description, image_url, author)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(slug)
    .bind(target_url)
    .bind(title)
    .bind(description)
    .bind(image_url)
    .bind(author)
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_link_by_id(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Fetch a single link by its slug (lower-cased by the caller), regardless
/// of active/expired status — the caller decides gating.
pub async fn get_link_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Link>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, slug, title, description, image_url, author, published_at,
                target_url, active, expires_at, total_clicks, valid_clicks, created_at
         FROM links WHERE slug = ?1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
}

/// Fetch a single link by its primary key (any status).
pub async fn get_link_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Link>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, slug, title, description, image_url, author, published_at,
                target_url, active, expires_at, total_clicks, valid_clicks, created_at
         FROM links WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Return all links joined with their total click counts, newest first.
pub async fn get_all_links_with_stats(pool: &SqlitePool) -> Result<Vec<LinkWithStats>, sqlx::Error> {
    let rows: Vec<Link> = sqlx::query_as(
        "SELECT id, slug, title, description, image_url, author, published_at,
                target_url, active, expires_at, total_clicks, valid_clicks, created_at
         FROM links ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|link| LinkWithStats {
            click_count: link.total_clicks,
            link,
        })
        .collect())
}

/// Permanently delete a link (cascades to click_logs via FK).
pub async fn delete_link(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM links WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

// ── Clicks ─────────────────────────────────────────────────────────────────

/// Atomically append a click-log row and bump the owning link's counters.
/// Both writes happen inside one transaction so counters and log never
/// drift apart, even under concurrent writers or a mid-write crash.
pub async fn record_click(pool: &SqlitePool, link_id: i64, record: &ClickRecord) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO click_logs (link_id, ip_address, user_agent, referer, device, valid, invalid_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(link_id)
    .bind(&record.ip)
    .bind(&record.user_agent)
    .bind(&record.referer)
    .bind(&record.device)
    .bind(record.valid)
    .bind(&record.invalid_reason)
    .execute(&mut *tx)
    .await?;

    if record.valid {
        sqlx::query(
            "UPDATE links SET total_clicks = total_clicks + 1, valid_clicks = valid_clicks + 1 WHERE id = ?1",
        )
        .bind(link_id)
        .execute(&mut *tx)
        .await?;
    } else {
        sqlx::query("UPDATE links SET total_clicks = total_clicks + 1 WHERE id = ?1")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

/// Fetch full analytics for one link: the link row, aggregate counts, and
/// the 500 most-recent individual click events.
pub async fn get_analytics(pool: &SqlitePool, link_id: i64) -> Result<Option<AnalyticsSummary>, sqlx::Error> {
    let link = match get_link_by_id(pool, link_id).await? {
        Some(l) => l,
        None => return Ok(None),
    };

    let unique_ips: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT ip_address) FROM click_logs
         WHERE link_id = ?1 AND ip_address IS NOT NULL",
    )
    .bind(link_id)
    .fetch_one(pool)
    .await?;

    let clicks: Vec<ClickLog> = sqlx::query_as(
        "SELECT id, link_id, ip_address, user_agent, referer, device, valid, invalid_reason, clicked_at
         FROM click_logs
         WHERE link_id = ?1
         ORDER BY clicked_at DESC
         LIMIT 500",
    )
    .bind(link_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(AnalyticsSummary {
        total_clicks: link.total_clicks,
        valid_clicks: link.valid_clicks,
        link,
        unique_ips,
        clicks,
    }))
}

// ── Banners ──────────────────────────────────────────────────────────────

/// Load every banner eligible for `kind` at time `now`: active, and within
/// its optional start/end window. Device/article/category targeting is
/// applied afterwards, in-process, by the Banner Store — this adapter only
/// narrows by kind and the active-window bounds, so the original JS
/// source's double-`$or`-key bug (the later `$or` silently overwrote the
/// earlier one) has no SQL equivalent to reproduce here.
pub async fn list_active_banners(pool: &SqlitePool, kind: &str) -> Result<Vec<Banner>, sqlx::Error> {
    let now = Utc::now().naive_utc();
    sqlx::query_as(
        "SELECT id, name, image_url, mobile_image_url, alt_text, target_slug, target_url, kind,
                active, start_at, end_at, device_constraint, target_articles, target_categories,
                weight, priority, display_width_percent, show_delay_seconds, auto_hide_after_ms,
                dismissible, impressions, clicks, unique_clicks, created_at
         FROM banners
         WHERE kind = ?1
           AND active = 1
           AND (start_at IS NULL OR start_at <= ?2)
           AND (end_at IS NULL OR end_at >= ?2)",
    )
    .bind(kind)
    .bind(now)
    .fetch_all(pool)
    .await
}

pub async fn get_banner_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Banner>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, name, image_url, mobile_image_url, alt_text, target_slug, target_url, kind,
                active, start_at, end_at, device_constraint, target_articles, target_categories,
                weight, priority, display_width_percent, show_delay_seconds, auto_hide_after_ms,
                dismissible, impressions, clicks, unique_clicks, created_at
         FROM banners WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Create a banner row; used by `POST /admin/banners` and by tests.
#[allow(clippy::too_many_arguments)]
pub async fn create_banner(
    pool: &SqlitePool,
    name: &str,
    image_url: &str,
    kind: &str,
    target_slug: Option<&str>,
    target_url: Option<&str>,
    weight: i64,
    priority: i64,
) -> Result<Banner, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO banners (name, image_url, kind, target_slug, target_url, weight, priority)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(name)
    .bind(image_url)
    .bind(kind)
    .bind(target_slug)
    .bind(target_url)
    .bind(weight)
    .bind(priority)
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_banner_by_id(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Atomic single-row counter bump — no read-modify-write race between
/// concurrent impressions on the same banner.
pub async fn record_banner_impression(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("UPDATE banners SET impressions = impressions + 1 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

/// Record a banner click. Increments `clicks` unconditionally; if `ip` has
/// not been seen before for this banner, also increments `unique_clicks`
/// and inserts it into the bounded dedup window, trimming the oldest half
/// once the window exceeds 10,000 entries (spec §4.6/§9).
pub async fn record_banner_click(pool: &SqlitePool, id: i64, ip: &str) -> Result<bool, sqlx::Error> {
    const DEDUP_CAP: i64 = 10_000;

    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM banner_clicked_ips WHERE banner_id = ?1 AND ip_address = ?2)",
    )
    .bind(id)
    .bind(ip)
    .fetch_one(&mut *tx)
    .await?;

    let affected = sqlx::query("UPDATE banners SET clicks = clicks + 1 WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if affected == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    if !exists {
        sqlx::query(
            "INSERT INTO banner_clicked_ips (banner_id, ip_address) VALUES (?1, ?2)
             ON CONFLICT (banner_id, ip_address) DO NOTHING",
        )
        .bind(id)
        .bind(ip)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE banners SET unique_clicks = unique_clicks + 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM banner_clicked_ips WHERE banner_id = ?1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        if count > DEDUP_CAP {
            // Drop the oldest half (FIFO). `unique_clicks` is cumulative and
            // is never decremented by this trim.
            let to_drop = count / 2;
            sqlx::query(
                "DELETE FROM banner_clicked_ips WHERE id IN (
                     SELECT id FROM banner_clicked_ips WHERE banner_id = ?1 ORDER BY id ASC LIMIT ?2
                 )",
            )
            .bind(id)
            .bind(to_drop)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(true)
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
    async fn repeated_ip_counts_once_toward_unique_clicks() {
        let pool = test_pool().await;
        let banner = create_banner(&pool, "promo", "https://img/a.png", "sticky_bottom", None, None, 10, 1)
            .await
            .unwrap();

        assert!(record_banner_click(&pool, banner.id, "1.1.1.1").await.unwrap());
        assert!(record_banner_click(&pool, banner.id, "1.1.1.1").await.unwrap());
        assert!(record_banner_click(&pool, banner.id, "2.2.2.2").await.unwrap());

        let reloaded = get_banner_by_id(&pool, banner.id).await.unwrap().unwrap();
        assert_eq!(reloaded.clicks, 3);
        assert_eq!(reloaded.unique_clicks, 2);
    }

    #[tokio::test]
    async fn click_on_missing_banner_returns_false() {
        let pool = test_pool().await;
        assert!(!record_banner_click(&pool, 999, "9.9.9.9").await.unwrap());
    }

    #[tokio::test]
    async fn dedup_window_trims_oldest_half_once_over_cap() {
        let pool = test_pool().await;
        let banner = create_banner(&pool, "promo", "https://img/a.png", "sticky_bottom", None, None, 10, 1)
            .await
            .unwrap();

        // Push the dedup window just over its 10,000-entry cap and confirm
        // the trim fires without losing the cumulative unique_clicks count.
        for i in 0..10_001 {
            record_banner_click(&pool, banner.id, &format!("10.0.{}.{}", i / 256, i % 256))
                .await
                .unwrap();
        }

        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM banner_clicked_ips WHERE banner_id = ?1",
        )
        .bind(banner.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(remaining < 10_001, "expected the FIFO trim to shrink the window, got {remaining}");

        let reloaded = get_banner_by_id(&pool, banner.id).await.unwrap().unwrap();
        assert_eq!(reloaded.unique_clicks, 10_001);
    }
}
