use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    uptime: u64,
    #[serde(rename = "queueDepth")]
    queue_depth: usize,
    #[serde(rename = "droppedClicks")]
    dropped_clicks: u64,
    #[serde(rename = "dbConnected")]
    db_connected: bool,
    // No Redis in this deployment (click/banner state lives in sqlite), but
    // the field stays in the wire shape so monitoring doesn't have to branch
    // on its absence.
    #[serde(rename = "redisConnected")]
    redis_connected: bool,
    #[serde(rename = "templateLoaded")]
    template_status: &'static str,
}

/// GET /health — never requires auth, always returns 200 so the load
/// balancer can use it as a liveness probe regardless of downstream state.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    let db_connected = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();

    Json(HealthBody {
        status: "ok",
        uptime: state.started_at.elapsed().as_secs(),
        queue_depth: state.click_recorder.queue_depth(),
        dropped_clicks: state.click_recorder.dropped_count(),
        db_connected,
        redis_connected: false,
        template_status: state.template_store.status().await.as_str(),
    })
}
