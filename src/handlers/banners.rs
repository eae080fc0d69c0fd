use crate::{
    error::AppError,
    ip_classifier::extract_client_ip,
    models::{BannerContext, BannerKind, BannerPublic},
    AppState,
};
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

#[derive(Deserialize)]
pub struct RandomBannerQuery {
    kind: String,
    device: Option<String>,
    #[serde(rename = "articleSlug")]
    article_slug: Option<String>,
    category: Option<String>,
}

#[derive(Serialize)]
struct ApiOk<T: Serialize> {
    success: bool,
    data: T,
}

/// GET /api/banners/random?kind=…&device=…&articleSlug=…&category=…
pub async fn random(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RandomBannerQuery>,
) -> Response {
    let kind = match BannerKind::parse(&query.kind) {
        Some(k) => k,
        None => return AppError::Invalid(format!("unknown banner kind '{}'", query.kind)).into_api_response(),
    };

    let ctx = BannerContext {
        kind,
        device: query.device.unwrap_or_else(|| "desktop".to_owned()),
        article_slug: query.article_slug,
        category: query.category,
    };

    let banner = match state.banner_store.select(&ctx).await {
        Ok(Some(b)) => b,
        Ok(None) => return AppError::NoActiveBanner.into_api_response(),
        Err(e) => return AppError::from(e).into_api_response(),
    };

    if let Err(e) = state.banner_store.record_impression(banner.id).await {
        tracing::error!(banner_id = banner.id, error = %e, "failed to record banner impression");
    }

    Json(ApiOk {
        success: true,
        data: BannerPublic::from(&banner),
    })
    .into_response()
}

/// POST /api/banners/:id/click
pub async fn click(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ip = extract_client_ip(&headers, addr.ip());

    match state.banner_store.record_click(id, &ip).await {
        Ok(true) => Json(serde_json::json!({ "success": true })).into_response(),
        Ok(false) => AppError::NotFound.into_api_response(),
        Err(e) => AppError::from(e).into_api_response(),
    }
}
