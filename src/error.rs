use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Typed error taxonomy shared by every handler (spec §7).
///
/// Each handler maps this into a response appropriate for its surface —
/// JSON for `/api/*`, a minimal HTML page for `/go/:slug`, and a 200 landing
/// page with error-flavoured meta for `/:slug` (never a raw 5xx, so search
/// crawlers always see something indexable).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    /// Banner selection found no eligible candidate. Distinct from
    /// `NotFound` because spec §6 mandates this exact wire message rather
    /// than the generic one.
    #[error("no active banner found")]
    NoActiveBanner,

    #[error("invalid request: {0}")]
    Invalid(String),

    /// Link/banner exists but is inactive or past expiry. Given the same
    /// user-visible treatment as `NotFound` so the gating policy is never
    /// revealed to the caller.
    #[error("unavailable")]
    Unavailable,

    #[error("transient failure: {0}")]
    Transient(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other => AppError::Transient(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ApiErrorBody {
    success: bool,
    error: String,
}

impl AppError {
    /// Render this error as a `{success:false, error:<short string>}` JSON
    /// body for the `/api/*` surface.
    pub fn into_api_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found"),
            AppError::NoActiveBanner => (StatusCode::NOT_FOUND, "No active banner found"),
            AppError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid request"),
            AppError::Unavailable => (StatusCode::NOT_FOUND, "not found"),
            AppError::Transient(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };
        tracing::error!(error = %self, "api request failed");
        (
            status,
            Json(ApiErrorBody {
                success: false,
                error: message.to_owned(),
            }),
        )
            .into_response()
    }

    /// Render this error as a minimal HTML error page for the `/go/:slug`
    /// bridge, which never needs SEO-friendly 200s.
    pub fn into_bridge_response(self) -> Response {
        let status = match &self {
            AppError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::NOT_FOUND,
        };
        tracing::warn!(error = %self, "redirect request failed");
        (status, "Link not found or no longer active.").into_response()
    }
}
