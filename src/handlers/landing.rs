use crate::{
    ip_classifier::extract_client_ip,
    meta_injector,
    models::{ClickRecord, MetaFields},
    AppState,
};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};

/// A static "decoy" page served to classifier-flagged bots that are not
/// social-preview crawlers (spec scenario 2; see DESIGN.md for the routing
/// policy this implements). Looks like an ordinary newspaper front page so
/// scraping tools that ignore `X-Robots-Tag` still gain nothing useful.
const DECOY_HTML: &str = r#"<!DOCTYPE html>
<html lang="vi">
<head><meta charset="utf-8"><title>Tin tức mới nhất</title></head>
<body>
<h1>Tin tức mới nhất</h1>
<p>Cập nhật tin tức, thể thao, giải trí và đời sống hàng ngày.</p>
</body>
</html>"#;

/// Crawlers allowed to see the full landing page instead of the decoy,
/// because their purpose is generating an accurate social-media preview.
fn is_social_preview_crawler(bot_kind: Option<&str>) -> bool {
    matches!(
        bot_kind,
        Some("facebook") | Some("twitter") | Some("linkedin") | Some("telegram") | Some("whatsapp") | Some("zalo")
    )
}

/// GET /:slug
pub async fn landing(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let slug = slug.to_lowercase();
    if slug.is_empty() || slug.contains('/') {
        return not_found_page(&state, &slug).await;
    }

    let ua = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let ua_class = state.ua_classifier.classify(ua);

    if ua_class.is_bot && !is_social_preview_crawler(ua_class.bot_kind.as_deref()) {
        return (
            StatusCode::OK,
            [("X-Robots-Tag", "noindex, nofollow")],
            Html(DECOY_HTML),
        )
            .into_response();
    }

    let link = match state.link_store.get_by_slug(&slug).await {
        Ok(Some(link)) if link.is_live() => link,
        Ok(_) => return not_found_page(&state, &slug).await,
        Err(e) => {
            tracing::error!(slug = %slug, error = %e, "landing handler DB error");
            return error_page(&state, &slug).await;
        }
    };

    if !ua_class.is_bot {
        let ip = extract_client_ip(&headers, addr.ip());
        let ip_class = state.ip_classifier.classify(&ip);
        let device = ua_class.device.as_str().to_owned();

        let (valid, invalid_reason) = if ip_class.is_allowed {
            (true, None)
        } else {
            (false, Some(ip_class.reason.as_str().to_owned()))
        };

        state.click_recorder.enqueue(
            link.id,
            ClickRecord {
                slug: slug.clone(),
                ip: Some(ip),
                user_agent: Some(ua.to_owned()),
                referer: headers
                    .get("referer")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
                device,
                valid,
                invalid_reason,
            },
        );
    }

    let url = format!("{}/{}", state.config.base_url, slug);
    let meta = MetaFields::from_link(&link, url, &state.config.site_name);
    render(&state, meta).await
}

async fn not_found_page(state: &AppState, slug: &str) -> Response {
    let url = format!("{}/{}", state.config.base_url, slug);
    render(state, MetaFields::not_found(url, &state.config.site_name)).await
}

async fn error_page(state: &AppState, slug: &str) -> Response {
    let url = format!("{}/{}", state.config.base_url, slug);
    render(state, MetaFields::error(url, &state.config.site_name)).await
}

async fn render(state: &AppState, meta: MetaFields) -> Response {
    let html = match state.template_store.get().await {
        Some(bytes) => {
            let template = String::from_utf8_lossy(&bytes);
            meta_injector::inject(&template, &meta)
        }
        None => fallback_html(&meta),
    };

    (
        StatusCode::OK,
        [("Content-Type", "text/html; charset=utf-8")],
        Html(html),
    )
        .into_response()
}

/// Minimal page used when the template has never loaded successfully —
/// still carries the meta tags plus a client-side redirect to root.
fn fallback_html(meta: &MetaFields) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><meta charset="utf-8">
<meta http-equiv="refresh" content="0; url=/">
<title>{title}</title>
<meta property="og:title" content="{title}">
<meta property="og:description" content="{desc}">
<meta property="og:url" content="{url}">
</head><body></body></html>"#,
        title = meta_injector::escape_html(&meta.title),
        desc = meta_injector::escape_html(&meta.description),
        url = meta_injector::escape_html(&meta.url),
    )
}
