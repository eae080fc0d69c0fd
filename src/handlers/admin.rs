use crate::{
    auth::AuthUser,
    db,
    models::{AnalyticsSummary, BannerKind, LinkWithStats},
    AppState,
};
use askama::Template;
use axum::{
    extract::{Form, Path, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde::Deserialize;
use std::sync::Arc;

// ── Template structs ───────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    links: Vec<LinkWithStats>,
    base_url: String,
    flash_success: Option<String>,
    flash_error: Option<String>,
}

#[derive(Template)]
#[template(path = "analytics.html")]
struct AnalyticsTemplate {
    summary: AnalyticsSummary,
    short_url: String,
    // Pre-computed breakdowns: (name, count, pct_of_total)
    top_devices: Vec<(String, i64, i64)>,
    top_referers: Vec<(String, i64, i64)>,
}

// ── Form types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginForm {
    password: String,
}

#[derive(Deserialize)]
pub struct CreateLinkForm {
    url: String,
    title: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    author: Option<String>,
    custom_slug: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateBannerForm {
    name: String,
    image_url: String,
    kind: String,
    target_slug: Option<String>,
    target_url: Option<String>,
    weight: i64,
    priority: i64,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /
/// Redirect root visitors to the configured ROOT_REDIRECT_URL.
/// Admins must navigate directly to /admin.
pub async fn index(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&state.config.root_redirect_url)
}

/// GET /admin
pub async fn admin_index() -> Redirect {
    Redirect::to("/admin/dashboard")
}

// ── Login / Logout ─────────────────────────────────────────────────────────

/// GET /admin/login
pub async fn login_page(jar: CookieJar, State(state): State<Arc<AppState>>) -> Response {
    if let Some(cookie) = jar.get("session_id") {
        if state.sessions.is_valid(cookie.value()).await {
            return Redirect::to("/admin/dashboard").into_response();
        }
    }
    LoginTemplate { error: None }.into_response()
}

/// POST /admin/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if form.password != state.config.admin_password {
        // Small artificial delay to blunt brute-force attempts.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        return LoginTemplate {
            error: Some("Incorrect password.".into()),
        }
        .into_response();
    }

    let token = state.sessions.create().await;

    let cookie = Cookie::build(("session_id", token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(
            state.config.session_duration_hours as i64 * 3600,
        ))
        .build();

    (jar.add(cookie), Redirect::to("/admin/dashboard")).into_response()
}

/// GET /admin/logout
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get("session_id") {
        state.sessions.remove(cookie.value()).await;
    }

    let removal = Cookie::build(("session_id", ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();

    (jar.add(removal), Redirect::to("/admin/login")).into_response()
}

// ── Dashboard ──────────────────────────────────────────────────────────────

/// GET /admin/dashboard
pub async fn dashboard(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Response {
    let flash_success = jar.get("flash_success").map(|c| c.value().to_owned());
    let flash_error = jar.get("flash_error").map(|c| c.value().to_owned());

    let clear_success = Cookie::build(("flash_success", ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();
    let clear_error = Cookie::build(("flash_error", ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();

    let links = match db::get_all_links_with_stats(&state.db).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to load links: {:?}", e);
            return (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load links",
            )
                .into_response();
        }
    };

    let tmpl = DashboardTemplate {
        links,
        base_url: state.config.base_url.clone(),
        flash_success,
        flash_error,
    };

    (jar.remove(clear_success).remove(clear_error), tmpl).into_response()
}

// ── Create link ────────────────────────────────────────────────────────────

/// POST /admin/links
pub async fn create_link(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CreateLinkForm>,
) -> Response {
    let url = form.url.trim().to_owned();
    if url.is_empty() {
        return set_flash_and_redirect(jar, None, Some("URL must not be empty."), "/admin/dashboard");
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return set_flash_and_redirect(
            jar,
            None,
            Some("URL must start with http:// or https://"),
            "/admin/dashboard",
        );
    }

    let slug = match form
        .custom_slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(slug) => {
            if !slug.chars().all(|c| c.is_alphanumeric() || c == '-') {
                return set_flash_and_redirect(
                    jar,
                    None,
                    Some("Custom slug may only contain letters, numbers, and hyphens."),
                    "/admin/dashboard",
                );
            }
            slug.to_lowercase()
        }
        None => generate_unique_slug(&state.db).await,
    };

    let title = nonempty(form.title.as_deref());
    let description = nonempty(form.description.as_deref());
    let image_url = nonempty(form.image_url.as_deref());
    let author = nonempty(form.author.as_deref());

    match db::create_link(
        &state.db,
        &slug,
        &url,
        title.as_deref(),
        description.as_deref(),
        image_url.as_deref(),
        author.as_deref(),
    )
    .await
    {
        Ok(link) => {
            state.cache.set(link.slug.clone(), link.clone());
            set_flash_and_redirect(
                jar,
                Some(&format!("Link created: {}/{}", state.config.base_url, link.slug)),
                None,
                "/admin/dashboard",
            )
        }
        Err(e) => {
            tracing::error!("Failed to create link: {:?}", e);
            let msg = if e.to_string().contains("UNIQUE") {
                "That slug is already taken. Try another.".to_owned()
            } else {
                format!("Database error: {e}")
            };
            set_flash_and_redirect(jar, None, Some(&msg), "/admin/dashboard")
        }
    }
}

// ── Create banner ──────────────────────────────────────────────────────────

/// POST /admin/banners
pub async fn create_banner(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CreateBannerForm>,
) -> Response {
    let name = form.name.trim();
    if name.is_empty() {
        return set_flash_and_redirect(jar, None, Some("Banner name must not be empty."), "/admin/dashboard");
    }
    if BannerKind::parse(&form.kind).is_none() {
        return set_flash_and_redirect(
            jar,
            None,
            Some("Unknown banner kind."),
            "/admin/dashboard",
        );
    }

    let target_slug = nonempty(form.target_slug.as_deref());
    let target_url = nonempty(form.target_url.as_deref());
    if target_slug.is_none() && target_url.is_none() {
        return set_flash_and_redirect(
            jar,
            None,
            Some("Banner needs a target slug or target URL."),
            "/admin/dashboard",
        );
    }

    match db::create_banner(
        &state.db,
        name,
        form.image_url.trim(),
        &form.kind,
        target_slug.as_deref(),
        target_url.as_deref(),
        form.weight,
        form.priority,
    )
    .await
    {
        Ok(banner) => set_flash_and_redirect(
            jar,
            Some(&format!("Banner created: {}", banner.name)),
            None,
            "/admin/dashboard",
        ),
        Err(e) => {
            tracing::error!("Failed to create banner: {:?}", e);
            set_flash_and_redirect(jar, None, Some(&format!("Database error: {e}")), "/admin/dashboard")
        }
    }
}

// ── Delete link ────────────────────────────────────────────────────────────

/// POST /admin/links/:id/delete
pub async fn delete_link(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Response {
    let link = match db::get_link_by_id(&state.db, id).await {
        Ok(Some(l)) => l,
        Ok(None) => {
            return set_flash_and_redirect(jar, None, Some("Link not found."), "/admin/dashboard");
        }
        Err(e) => {
            tracing::error!("Failed to fetch link {}: {:?}", id, e);
            return set_flash_and_redirect(
                jar,
                None,
                Some("Database error while looking up link."),
                "/admin/dashboard",
            );
        }
    };

    match db::delete_link(&state.db, id).await {
        Ok(true) => {
            state.cache.remove(&link.slug);
            set_flash_and_redirect(
                jar,
                Some(&format!("Link '{}' deleted.", link.slug)),
                None,
                "/admin/dashboard",
            )
        }
        Ok(false) => set_flash_and_redirect(jar, None, Some("Link not found."), "/admin/dashboard"),
        Err(e) => {
            tracing::error!("Failed to delete link {}: {:?}", id, e);
            set_flash_and_redirect(jar, None, Some("Failed to delete link."), "/admin/dashboard")
        }
    }
}

// ── Analytics ──────────────────────────────────────────────────────────────

/// GET /admin/links/:id/analytics
pub async fn analytics(_auth: AuthUser, State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    let summary = match db::get_analytics(&state.db, id).await {
        Ok(Some(s)) => s,
        Ok(None) => return (axum::http::StatusCode::NOT_FOUND, "Link not found.").into_response(),
        Err(e) => {
            tracing::error!("Failed to load analytics for link {}: {:?}", id, e);
            return (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load analytics.",
            )
                .into_response();
        }
    };

    let short_url = format!("{}/{}", state.config.base_url, summary.link.slug);

    let total = summary.total_clicks;
    let top_devices = with_pct(
        count_field(summary.clicks.iter().map(|c| c.device.as_deref())),
        total,
    );
    let top_referers = with_pct(
        count_field(summary.clicks.iter().map(|c| c.referer.as_deref())),
        total,
    );

    AnalyticsTemplate {
        summary,
        short_url,
        top_devices,
        top_referers,
    }
    .into_response()
}

// ── Private helpers ────────────────────────────────────────────────────────

fn nonempty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

/// Set a flash cookie and redirect to the given path.
fn set_flash_and_redirect(
    jar: CookieJar,
    success: Option<&str>,
    error: Option<&str>,
    destination: &str,
) -> Response {
    let mut jar = jar;

    if let Some(msg) = success {
        let c = Cookie::build(("flash_success", msg.to_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(30))
            .build();
        jar = jar.add(c);
    }

    if let Some(msg) = error {
        let c = Cookie::build(("flash_error", msg.to_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(30))
            .build();
        jar = jar.add(c);
    }

    (jar, Redirect::to(destination)).into_response()
}

/// Generate a random 7-character alphanumeric slug that doesn't already
/// exist in the database. Tries up to 10 times; the UNIQUE constraint in
/// the database is the real guard against a collision slipping through.
async fn generate_unique_slug(pool: &sqlx::SqlitePool) -> String {
    for _ in 0..10 {
        let slug = random_slug(7);
        match db::get_link_by_slug(pool, &slug).await {
            Ok(None) => return slug,
            _ => continue,
        }
    }
    random_slug(9)
}

fn random_slug(len: usize) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Tally occurrences of each non-None, non-empty value, sort descending by
/// count, and return the top 10.
fn count_field<'a>(iter: impl Iterator<Item = Option<&'a str>>) -> Vec<(String, i64)> {
    let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    for val in iter.flatten() {
        if !val.is_empty() {
            *counts.entry(val.to_owned()).or_insert(0) += 1;
        }
    }
    let mut sorted: Vec<(String, i64)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));
    sorted.truncate(10);
    sorted
}

/// Attach a percentage-of-total column to each breakdown row.
fn with_pct(items: Vec<(String, i64)>, total: i64) -> Vec<(String, i64, i64)> {
    items
        .into_iter()
        .map(|(name, count)| {
            let pct = if total > 0 { count * 100 / total } else { 0 };
            (name, count, pct)
        })
        .collect()
}
