use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./gateway.db"
    pub database_url: String,

    /// Plain-text admin password loaded from the environment at startup
    pub admin_password: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port the landing/admin listener binds to.
    pub port: u16,

    /// Port the referrer-washing bridge (`/go/:slug`) listener binds to.
    pub bridge_port: u16,

    /// Public base URL used in generated Open Graph URLs, e.g. "https://go.example.com"
    /// Must NOT have a trailing slash.
    pub base_url: String,

    /// Site name injected into `__META_SITE_NAME__`.
    pub site_name: String,

    /// How many hours an admin session token remains valid
    pub session_duration_hours: u64,

    /// URL to redirect visitors to when they hit the root path ("/").
    pub root_redirect_url: String,

    /// Path to the IPv4 range database (MaxMind-format .mmdb).
    pub ip_db_path_v4: String,

    /// Path to the IPv6 range database.
    pub ip_db_path_v6: String,

    /// Path to the static landing-page HTML template.
    pub template_path: String,

    /// Country codes allowed through the IP classifier's allow-list gate.
    pub allow_countries: HashSet<String>,

    /// Lower-cased ISP-name substrings that mark an address as a datacenter.
    pub datacenter_isps: Vec<String>,

    /// IP classifier cache TTL.
    pub ip_cache_ttl: Duration,

    /// IP classifier cache capacity (bounded LRU).
    pub ip_cache_capacity: u64,

    /// Click Recorder bounded-queue capacity.
    pub click_queue_capacity: usize,

    /// Click Recorder worker pool size.
    pub click_worker_count: usize,

    /// Per-request DB timeout.
    pub request_timeout: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_csv_lower(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_lowercase()).collect(),
    }
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let admin_password = std::env::var("ADMIN_PASSWORD")
            .context("ADMIN_PASSWORD must be set in the environment or .env file")?;

        if admin_password.trim().is_empty() {
            anyhow::bail!("ADMIN_PASSWORD must not be empty");
        }

        let port = env_or("PORT", "3001")
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let bridge_port = env_or("BRIDGE_PORT", "3002")
            .parse::<u16>()
            .context("BRIDGE_PORT must be a valid port number (1–65535)")?;

        let session_duration_hours = env_or("SESSION_DURATION_HOURS", "24")
            .parse::<u64>()
            .unwrap_or(24);

        let base_url = env_or("BASE_URL", &format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let root_redirect_url = env_or("ROOT_REDIRECT_URL", "https://example.com")
            .trim_end_matches('/')
            .to_owned();

        let allow_countries: HashSet<String> = env_csv_lower("ALLOW_COUNTRIES", &["VN"])
            .into_iter()
            .map(|s| s.to_uppercase())
            .collect();

        let datacenter_isps = env_csv_lower(
            "DATACENTER_ISPS",
            &[
                "google",
                "amazon",
                "microsoft",
                "cloudflare",
                "ovh",
                "digitalocean",
                "linode",
                "hetzner",
            ],
        );

        let ip_cache_ttl_secs = env_or("IP_CACHE_TTL_SECONDS", "300")
            .parse::<u64>()
            .unwrap_or(300);

        let ip_cache_capacity = env_or("IP_CACHE_CAPACITY", "50000")
            .parse::<u64>()
            .unwrap_or(50_000);

        let click_queue_capacity = env_or("CLICK_QUEUE_CAPACITY", "10000")
            .parse::<usize>()
            .unwrap_or(10_000);

        let click_worker_count = env_or("CLICK_WORKER_COUNT", "4")
            .parse::<usize>()
            .unwrap_or(4);

        let request_timeout_ms = env_or("REQUEST_TIMEOUT_MS", "2000")
            .parse::<u64>()
            .unwrap_or(2000);

        Ok(Self {
            database_url: env_or("DATABASE_URL", "sqlite:./gateway.db"),
            admin_password,
            host: env_or("HOST", "0.0.0.0"),
            port,
            bridge_port,
            base_url,
            site_name: env_or("SITE_NAME", "Affiliate Gateway"),
            session_duration_hours,
            root_redirect_url,
            ip_db_path_v4: env_or("IP_DB_PATH_V4", "./data/ip_ranges_v4.mmdb"),
            ip_db_path_v6: env_or("IP_DB_PATH_V6", "./data/ip_ranges_v6.mmdb"),
            template_path: env_or("TEMPLATE_PATH", "./assets/landing.html"),
            allow_countries,
            datacenter_isps,
            ip_cache_ttl: Duration::from_secs(ip_cache_ttl_secs),
            ip_cache_capacity,
            click_queue_capacity,
            click_worker_count,
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }
}
