use regex::RegexSet;
use woothee::parser::Parser;

/// Device bucket derived from the User-Agent string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Mobile,
    Desktop,
    Unknown,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Mobile => "mobile",
            Device::Desktop => "desktop",
            Device::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UaClassification {
    pub is_bot: bool,
    pub bot_kind: Option<String>,
    pub device: Device,
}

/// Bot / social-preview-crawler patterns, checked in order so `bot_kind`
/// names the first (most specific) match. Matched case-insensitively.
const BOT_PATTERNS: &[(&str, &str)] = &[
    ("facebookexternalhit", "facebook"),
    ("twitterbot", "twitter"),
    ("linkedinbot", "linkedin"),
    ("telegrambot", "telegram"),
    ("whatsapp", "whatsapp"),
    ("zalo", "zalo"),
    ("googlebot", "googlebot"),
    ("bingbot", "bingbot"),
    ("slackbot", "slack"),
    ("discordbot", "discord"),
    ("bot", "generic_bot"),
    ("crawler", "generic_crawler"),
    ("spider", "generic_spider"),
];

const MOBILE_MARKERS: &[&str] = &["mobile", "android", "iphone", "ipad", "ipod"];

/// Regex-driven UA classifier. woothee supplies a generic device/category
/// hint; the bot pattern set distinguishes *which* crawler matched, which
/// the landing handler needs to decide the social-preview policy (see
/// DESIGN.md).
pub struct UaClassifier {
    bot_set: RegexSet,
    parser: Parser,
}

impl UaClassifier {
    pub fn new() -> Self {
        let patterns: Vec<String> = BOT_PATTERNS
            .iter()
            .map(|(pattern, _)| format!("(?i){pattern}"))
            .collect();
        let bot_set = RegexSet::new(&patterns).expect("bot pattern set is valid");
        Self {
            bot_set,
            parser: Parser::new(),
        }
    }

    pub fn classify(&self, ua: &str) -> UaClassification {
        if ua.is_empty() {
            return UaClassification {
                is_bot: false,
                bot_kind: None,
                device: Device::Unknown,
            };
        }

        let matches = self.bot_set.matches(ua);
        let bot_kind = matches
            .iter()
            .next()
            .map(|idx| BOT_PATTERNS[idx].1.to_owned());
        let is_bot = bot_kind.is_some();

        let device = self.classify_device(ua);

        UaClassification {
            is_bot,
            bot_kind,
            device,
        }
    }

    fn classify_device(&self, ua: &str) -> Device {
        let ua_lower = ua.to_lowercase();
        if MOBILE_MARKERS.iter().any(|m| ua_lower.contains(m)) {
            return Device::Mobile;
        }

        // Fall back to woothee's category for UAs that don't carry an
        // explicit mobile marker but are still clearly handheld.
        if let Some(result) = self.parser.parse(ua) {
            if matches!(result.category.as_ref(), "smartphone" | "mobilephone") {
                return Device::Mobile;
            }
        }

        Device::Desktop
    }
}

impl Default for UaClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_facebook_crawler() {
        let c = UaClassifier::new();
        let result = c.classify("facebookexternalhit/1.1");
        assert!(result.is_bot);
        assert_eq!(result.bot_kind.as_deref(), Some("facebook"));
    }

    #[test]
    fn detects_mobile_desktop() {
        let c = UaClassifier::new();
        assert_eq!(
            c.classify("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)").device,
            Device::Mobile
        );
        assert_eq!(
            c.classify("Mozilla/5.0 (Windows NT 10.0; Win64; x64)").device,
            Device::Desktop
        );
    }

    #[test]
    fn empty_ua_is_unknown_non_bot() {
        let c = UaClassifier::new();
        let result = c.classify("");
        assert!(!result.is_bot);
        assert_eq!(result.device, Device::Unknown);
    }
}
