use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short-link record from the `links` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Link {
    pub id: i64,
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub target_url: String,
    pub active: bool,
    pub expires_at: Option<NaiveDateTime>,
    pub total_clicks: i64,
    pub valid_clicks: i64,
    pub created_at: NaiveDateTime,
}

impl Link {
    /// A link is servable for redirect purposes only while active and not
    /// past its expiry. Expired behaves as inactive.
    pub fn is_live(&self) -> bool {
        if !self.active {
            return false;
        }
        match self.expires_at {
            Some(exp) => exp > Utc::now().naive_utc(),
            None => true,
        }
    }
}

/// One immutable click-log row, joined to its owning link.
#[derive(Debug, Clone, sqlx::FromRow)]
#[allow(dead_code)]
pub struct ClickLog {
    pub id: i64,
    pub link_id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub device: Option<String>,
    pub valid: bool,
    pub invalid_reason: Option<String>,
    pub clicked_at: NaiveDateTime,
}

/// A click event produced by the Landing/Redirect handlers and consumed by
/// the Click Recorder. Never mutated once created.
#[derive(Debug, Clone)]
pub struct ClickRecord {
    pub slug: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub device: String,
    pub valid: bool,
    pub invalid_reason: Option<String>,
}

/// A link row joined with its total click count, used on the admin dashboard.
#[derive(Debug, Clone)]
pub struct LinkWithStats {
    pub link: Link,
    pub click_count: i64,
}

/// Device constraint a banner can be targeted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceConstraint {
    Any,
    Mobile,
    Desktop,
}

impl DeviceConstraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceConstraint::Any => "any",
            DeviceConstraint::Mobile => "mobile",
            DeviceConstraint::Desktop => "desktop",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "mobile" => DeviceConstraint::Mobile,
            "desktop" => DeviceConstraint::Desktop,
            _ => DeviceConstraint::Any,
        }
    }

    /// `true` if a request from `device` may be served this banner.
    pub fn matches(&self, device: &str) -> bool {
        match self {
            DeviceConstraint::Any => true,
            DeviceConstraint::Mobile => device == "mobile",
            DeviceConstraint::Desktop => device == "desktop",
        }
    }
}

/// Placement slot a banner occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerKind {
    StickyBottom,
    CenterPopup,
    Sidebar,
    Inline,
    Header,
}

impl BannerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BannerKind::StickyBottom => "sticky_bottom",
            BannerKind::CenterPopup => "center_popup",
            BannerKind::Sidebar => "sidebar",
            BannerKind::Inline => "inline",
            BannerKind::Header => "header",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sticky_bottom" => Some(BannerKind::StickyBottom),
            "center_popup" => Some(BannerKind::CenterPopup),
            "sidebar" => Some(BannerKind::Sidebar),
            "inline" => Some(BannerKind::Inline),
            "header" => Some(BannerKind::Header),
            _ => None,
        }
    }
}

/// A banner-advertisement record from the `banners` table.
///
/// `target_articles` / `target_categories` are stored as comma-separated
/// strings (empty = matches everything) rather than normalized join tables,
/// split lazily by the store's filtering pipeline.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Banner {
    pub id: i64,
    pub name: String,
    pub image_url: String,
    pub mobile_image_url: Option<String>,
    pub alt_text: String,
    pub target_slug: Option<String>,
    pub target_url: Option<String>,
    pub kind: String,
    pub active: bool,
    pub start_at: Option<NaiveDateTime>,
    pub end_at: Option<NaiveDateTime>,
    pub device_constraint: String,
    pub target_articles: String,
    pub target_categories: String,
    pub weight: i64,
    pub priority: i64,
    pub display_width_percent: i64,
    pub show_delay_seconds: i64,
    pub auto_hide_after_ms: Option<i64>,
    pub dismissible: bool,
    pub impressions: i64,
    pub clicks: i64,
    pub unique_clicks: i64,
    pub created_at: NaiveDateTime,
}

impl Banner {
    pub fn target_article_set(&self) -> Vec<&str> {
        split_set(&self.target_articles)
    }

    pub fn target_category_set(&self) -> Vec<&str> {
        split_set(&self.target_categories)
    }
}

fn split_set(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Request context a banner selection is evaluated against (spec §4.6).
#[derive(Debug, Clone)]
pub struct BannerContext {
    pub kind: BannerKind,
    pub device: String,
    pub article_slug: Option<String>,
    pub category: Option<String>,
}

/// Public, wire-format projection of a `Banner` returned by
/// `GET /api/banners/random`.
#[derive(Debug, Serialize)]
pub struct BannerPublic {
    pub id: i64,
    pub name: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "mobileImageUrl")]
    pub mobile_image_url: Option<String>,
    #[serde(rename = "targetSlug")]
    pub target_slug: Option<String>,
    pub kind: String,
    #[serde(rename = "altText")]
    pub alt_text: String,
    #[serde(rename = "showDelaySeconds")]
    pub show_delay_seconds: i64,
    #[serde(rename = "autoHideAfterMs")]
    pub auto_hide_after_ms: Option<i64>,
    pub dismissible: bool,
    #[serde(rename = "displayWidthPercent")]
    pub display_width_percent: i64,
}

impl From<&Banner> for BannerPublic {
    fn from(b: &Banner) -> Self {
        BannerPublic {
            id: b.id,
            name: b.name.clone(),
            image_url: b.image_url.clone(),
            mobile_image_url: b.mobile_image_url.clone(),
            target_slug: b.target_slug.clone(),
            kind: b.kind.clone(),
            alt_text: b.alt_text.clone(),
            show_delay_seconds: b.show_delay_seconds,
            auto_hide_after_ms: b.auto_hide_after_ms,
            dismissible: b.dismissible,
            display_width_percent: b.display_width_percent,
        }
    }
}

/// Metadata used to fill the eight landing-page placeholders.
#[derive(Debug, Clone, Default)]
pub struct MetaFields {
    pub title: String,
    pub description: String,
    pub image: String,
    pub url: String,
    pub site_name: String,
    pub og_type: String,
    pub author: String,
    pub published_time: String,
}

impl MetaFields {
    pub fn from_link(link: &Link, url: String, site_name: &str) -> Self {
        MetaFields {
            title: link.title.clone().unwrap_or_default(),
            description: link.description.clone().unwrap_or_default(),
            image: link.image_url.clone().unwrap_or_default(),
            url,
            site_name: site_name.to_owned(),
            og_type: "article".to_owned(),
            author: link.author.clone().unwrap_or_default(),
            published_time: link
                .published_at
                .map(|d| d.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                .unwrap_or_default(),
        }
    }

    pub fn not_found(url: String, site_name: &str) -> Self {
        MetaFields {
            title: "Không tìm thấy".to_owned(),
            url,
            site_name: site_name.to_owned(),
            og_type: "website".to_owned(),
            ..Default::default()
        }
    }

    pub fn error(url: String, site_name: &str) -> Self {
        MetaFields {
            title: "Lỗi - Không thể tải trang".to_owned(),
            url,
            site_name: site_name.to_owned(),
            og_type: "website".to_owned(),
            ..Default::default()
        }
    }
}

/// Summary statistics for the analytics page of a single link.
#[derive(Debug, Clone)]
pub struct AnalyticsSummary {
    pub link: Link,
    pub total_clicks: i64,
    pub valid_clicks: i64,
    pub unique_ips: i64,
    pub clicks: Vec<ClickLog>,
}
