use crate::{
    error::AppError,
    ip_classifier::extract_client_ip,
    models::ClickRecord,
    AppState,
};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::{net::SocketAddr, sync::Arc};

const PRIVACY_HEADERS: &[(&str, &str)] = &[
    ("Referrer-Policy", "no-referrer-when-downgrade"),
    ("Cache-Control", "no-store, no-cache, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
];

/// GET /go/:slug — the referrer-washing bridge, served on a separate
/// listener from the landing page (§4.9). Resolves the link, sets the
/// privacy headers, issues a 302, and enqueues the click without delaying
/// the response.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let slug = slug.to_lowercase();
    if slug.is_empty() || slug.contains('/') {
        return AppError::Invalid("empty or malformed slug".into()).into_bridge_response();
    }

    let link = match state.link_store.get_by_slug(&slug).await {
        Ok(Some(link)) if link.is_live() => link,
        Ok(_) => return AppError::NotFound.into_bridge_response(),
        Err(e) => {
            tracing::error!(slug = %slug, error = %e, "redirect handler DB error");
            return AppError::from(e).into_bridge_response();
        }
    };

    let ua = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let ua_class = state.ua_classifier.classify(ua);
    let ip = extract_client_ip(&headers, addr.ip());
    let ip_class = state.ip_classifier.classify(&ip);

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
            device: ua_class.device.as_str().to_owned(),
            valid,
            invalid_reason,
        },
    );

    let mut response = Redirect::to(&link.target_url).into_response();
    *response.status_mut() = StatusCode::FOUND;
    for (name, value) in PRIVACY_HEADERS {
        response
            .headers_mut()
            .insert(*name, value.parse().expect("static header value is valid"));
    }
    response
}
