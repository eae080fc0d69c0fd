use crate::models::MetaFields;

/// The eight named placeholders the landing-page template may contain.
/// Any other `__...__` token in the template is left untouched.
const PLACEHOLDERS: &[(&str, fn(&MetaFields) -> &str)] = &[
    ("__META_TITLE__", |m| m.title.as_str()),
    ("__META_DESCRIPTION__", |m| m.description.as_str()),
    ("__META_IMAGE__", |m| m.image.as_str()),
    ("__META_URL__", |m| m.url.as_str()),
    ("__META_SITE_NAME__", |m| m.site_name.as_str()),
    ("__META_TYPE__", |m| m.og_type.as_str()),
    ("__META_AUTHOR__", |m| m.author.as_str()),
    ("__META_PUBLISHED_TIME__", |m| m.published_time.as_str()),
];

/// Substitute the eight named placeholders in `template` with HTML-escaped
/// values from `meta`. Missing fields become empty strings — never the
/// literal placeholder. Pure and deterministic: no I/O.
pub fn inject(template: &str, meta: &MetaFields) -> String {
    let mut html = template.to_owned();
    for (placeholder, accessor) in PLACEHOLDERS {
        let escaped = escape_html(accessor(meta));
        html = html.replace(placeholder, &escaped);
    }
    html
}

/// Replace `&<>"'` with their named/numeric HTML entities.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str) -> MetaFields {
        MetaFields {
            title: title.to_owned(),
            description: "desc".to_owned(),
            image: "https://img/1.jpg".to_owned(),
            url: "https://example.com/flash50".to_owned(),
            site_name: "Example".to_owned(),
            og_type: "article".to_owned(),
            author: "Author".to_owned(),
            published_time: "2026-01-01T00:00:00Z".to_owned(),
        }
    }

    #[test]
    fn substitutes_all_placeholders() {
        let template = "<title>__META_TITLE__</title>\
            <meta property=\"og:description\" content=\"__META_DESCRIPTION__\">\
            <meta property=\"og:image\" content=\"__META_IMAGE__\">\
            <meta property=\"og:url\" content=\"__META_URL__\">\
            <meta property=\"og:site_name\" content=\"__META_SITE_NAME__\">\
            <meta property=\"og:type\" content=\"__META_TYPE__\">\
            <meta name=\"author\" content=\"__META_AUTHOR__\">\
            <meta property=\"article:published_time\" content=\"__META_PUBLISHED_TIME__\">";
        let html = inject(template, &meta("Flash Sale 50%"));
        assert!(html.contains("<title>Flash Sale 50%</title>"));
        assert!(!html.contains("__META_"));
    }

    #[test]
    fn missing_fields_become_empty_not_literal() {
        let template = "__META_AUTHOR__|__META_PUBLISHED_TIME__";
        let html = inject(template, &MetaFields::not_found("u".into(), "Site"));
        assert_eq!(html, "|");
    }

    #[test]
    fn escapes_html_special_characters() {
        let html = inject("__META_TITLE__", &meta("<script>&\"'"));
        assert_eq!(html, "&lt;script&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn unknown_placeholders_untouched() {
        let html = inject("__UNKNOWN_TOKEN__ __META_TITLE__", &meta("X"));
        assert_eq!(html, "__UNKNOWN_TOKEN__ X");
    }
}
