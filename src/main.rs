use std::{net::SocketAddr, sync::Arc, time::Duration, time::Instant};

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod banner_store;
mod cache;
mod click_recorder;
mod config;
mod db;
mod error;
mod handlers;
mod ip_classifier;
mod link_store;
mod meta_injector;
mod models;
mod template_store;
mod ua_classifier;

use auth::SessionStore;
use banner_store::BannerStore;
use cache::LinkCache;
use click_recorder::ClickRecorder;
use ip_classifier::IpClassifier;
use link_store::LinkStore;
use template_store::TemplateStore;
use ua_classifier::UaClassifier;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: config::AppConfig,
    pub cache: LinkCache,
    pub sessions: SessionStore,
    pub link_store: LinkStore,
    pub banner_store: BannerStore,
    pub ip_classifier: IpClassifier,
    pub ua_classifier: UaClassifier,
    pub template_store: TemplateStore,
    pub click_recorder: ClickRecorder,
    pub started_at: Instant,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "affiliate_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting affiliate-gateway on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);

    let db = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(
            config
                .database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .foreign_keys(true),
        )
        .await?;

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    let cache = LinkCache::new();
    db::warm_cache(&db, &cache).await?;

    let sessions = SessionStore::new(config.session_duration_hours);
    let link_store = LinkStore::new(db.clone(), cache.clone());
    let banner_store = BannerStore::new(db.clone());

    let ip_classifier = IpClassifier::new(
        &config.ip_db_path_v4,
        &config.ip_db_path_v6,
        config.allow_countries.clone(),
        config.datacenter_isps.clone(),
        config.ip_cache_ttl,
        config.ip_cache_capacity,
    );
    let ua_classifier = UaClassifier::new();
    let template_store = TemplateStore::new(config.template_path.clone());
    // Warm the template once at startup so the first request doesn't pay
    // the disk read, and so /health reports an accurate status immediately.
    let _ = template_store.get().await;

    let click_recorder = ClickRecorder::spawn(
        link_store.clone(),
        config.click_queue_capacity,
        config.click_worker_count,
    );

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        cache,
        sessions,
        link_store,
        banner_store,
        ip_classifier,
        ua_classifier,
        template_store,
        click_recorder,
        started_at: Instant::now(),
    });

    // ── Router ─────────────────────────────────────────────────────────────
    let admin_router = Router::new()
        .route("/", get(handlers::admin::admin_index))
        .route(
            "/login",
            get(handlers::admin::login_page).post(handlers::admin::login),
        )
        .route("/logout", get(handlers::admin::logout))
        .route("/dashboard", get(handlers::admin::dashboard))
        .route("/links", post(handlers::admin::create_link))
        .route("/links/:id/delete", post(handlers::admin::delete_link))
        .route("/links/:id/analytics", get(handlers::admin::analytics))
        .route("/banners", post(handlers::admin::create_banner));

    let api_router = Router::new()
        .route("/banners/random", get(handlers::banners::random))
        .route("/banners/:id/click", post(handlers::banners::click));

    let main_app = Router::new()
        .route("/", get(handlers::admin::index))
        .route("/health", get(handlers::health::health))
        .nest("/admin", admin_router)
        .nest("/api", api_router)
        // Short-link landing page — must come LAST so /admin and /api win.
        .route("/:slug", get(handlers::landing::landing))
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.request_timeout)),
        );

    let bridge_app = Router::new()
        .route("/go/:slug", get(handlers::redirect::redirect))
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.request_timeout)),
        );

    // ── Serve ──────────────────────────────────────────────────────────────
    let main_listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let bridge_listener = tokio::net::TcpListener::bind((config.host.as_str(), config.bridge_port)).await?;
    tracing::info!("Main listener on http://{}", main_listener.local_addr()?);
    tracing::info!("Bridge listener on http://{}", bridge_listener.local_addr()?);

    let main_server = axum::serve(
        main_listener,
        main_app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    let bridge_server = axum::serve(
        bridge_listener,
        bridge_app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_recorder = state.click_recorder.clone();
    tokio::select! {
        res = main_server => res?,
        res = bridge_server => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, draining click queue");
            shutdown_recorder.shutdown(Duration::from_secs(5)).await;
        }
    }

    Ok(())
}
