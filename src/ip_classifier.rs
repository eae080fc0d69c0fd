use moka::sync::Cache;
use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Why a classification result came out the way it did. Surfaced on click
/// records as `invalid_reason` when `is_allowed` is false, and used for
/// observability when a request was allowed despite a degraded lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    PrivateIp,
    Allowed,
    SuspiciousIsp,
    DisallowedCountry,
    DbNotReady,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::PrivateIp => "private_ip",
            Reason::Allowed => "allowed",
            Reason::SuspiciousIsp => "suspicious_isp",
            Reason::DisallowedCountry => "disallowed_country",
            Reason::DbNotReady => "db_not_ready",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IpClassification {
    pub country: Option<String>,
    pub isp: Option<String>,
    pub is_private: bool,
    pub is_datacenter: bool,
    pub is_allowed: bool,
    pub reason: Reason,
}

/// Minimal shape of a range-database record: the on-disk `.mmdb` files map
/// each range to a country code and an ISP/organization string.
#[derive(Debug, Clone, Deserialize)]
struct RangeRecord {
    country: Option<CountryField>,
    isp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CountryField {
    iso_code: Option<String>,
}

/// Loads the IPv4/IPv6 range databases at startup and classifies client IPs
/// against a configured country allow-list and datacenter-ISP blacklist.
///
/// Lookups are memoized in a TTL + bounded-LRU cache (`moka`) so that a
/// bursty client IP is resolved against the on-disk database at most once
/// per cache window.
pub struct IpClassifier {
    db_v4: Option<maxminddb::Reader<Vec<u8>>>,
    db_v6: Option<maxminddb::Reader<Vec<u8>>>,
    allow_countries: std::collections::HashSet<String>,
    datacenter_isps: Vec<String>,
    cache: Cache<String, CachedClassification>,
}

#[derive(Debug, Clone)]
struct CachedClassification {
    country: Option<String>,
    isp: Option<String>,
    is_datacenter: bool,
    is_allowed: bool,
    reason: Reason,
}

impl IpClassifier {
    pub fn new(
        db_path_v4: &str,
        db_path_v6: &str,
        allow_countries: std::collections::HashSet<String>,
        datacenter_isps: Vec<String>,
        cache_ttl: Duration,
        cache_capacity: u64,
    ) -> Self {
        let db_v4 = match maxminddb::Reader::open_readfile(db_path_v4) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(path = db_path_v4, error = %e, "IPv4 range database unavailable, failing open");
                None
            }
        };
        let db_v6 = match maxminddb::Reader::open_readfile(db_path_v6) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(path = db_path_v6, error = %e, "IPv6 range database unavailable, failing open");
                None
            }
        };

        let cache = Cache::builder()
            .max_capacity(cache_capacity)
            .time_to_live(cache_ttl)
            .build();

        Self {
            db_v4,
            db_v6,
            allow_countries,
            datacenter_isps,
            cache,
        }
    }

    /// Classify a single client IP address (already extracted from the
    /// request by the caller — see `extract_client_ip`).
    pub fn classify(&self, ip_str: &str) -> IpClassification {
        let ip_str = ip_str.strip_prefix("::ffff:").unwrap_or(ip_str);

        let ip = match IpAddr::from_str(ip_str) {
            Ok(ip) => ip,
            Err(_) => {
                return IpClassification {
                    country: None,
                    isp: None,
                    is_private: true,
                    is_datacenter: false,
                    is_allowed: true,
                    reason: Reason::PrivateIp,
                };
            }
        };

        if is_private(ip) {
            return IpClassification {
                country: None,
                isp: None,
                is_private: true,
                is_datacenter: false,
                is_allowed: true,
                reason: Reason::PrivateIp,
            };
        }

        if let Some(cached) = self.cache.get(ip_str) {
            return IpClassification {
                country: cached.country,
                isp: cached.isp,
                is_private: false,
                is_datacenter: cached.is_datacenter,
                is_allowed: cached.is_allowed,
                reason: cached.reason,
            };
        }

        let classification = self.lookup(ip);
        self.cache.insert(
            ip_str.to_owned(),
            CachedClassification {
                country: classification.country.clone(),
                isp: classification.isp.clone(),
                is_datacenter: classification.is_datacenter,
                is_allowed: classification.is_allowed,
                reason: classification.reason,
            },
        );
        classification
    }

    fn lookup(&self, ip: IpAddr) -> IpClassification {
        let reader = match ip {
            IpAddr::V4(_) => self.db_v4.as_ref(),
            IpAddr::V6(_) => self.db_v6.as_ref(),
        };

        let reader = match reader {
            Some(r) => r,
            None => {
                return IpClassification {
                    country: None,
                    isp: None,
                    is_private: false,
                    is_datacenter: false,
                    is_allowed: true,
                    reason: Reason::DbNotReady,
                };
            }
        };

        let record: RangeRecord = match reader.lookup(ip) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "range database lookup failed, failing open");
                return IpClassification {
                    country: None,
                    isp: None,
                    is_private: false,
                    is_datacenter: false,
                    is_allowed: true,
                    reason: Reason::DbNotReady,
                };
            }
        };

        let country = record.country.and_then(|c| c.iso_code);
        let isp = record.isp;

        let is_datacenter = is_datacenter_isp(isp.as_deref(), &self.datacenter_isps);
        let (is_allowed, reason) = classify_record(
            country.as_deref(),
            isp.as_deref(),
            &self.allow_countries,
            &self.datacenter_isps,
        );

        IpClassification {
            country,
            isp,
            is_private: false,
            is_datacenter,
            is_allowed,
            reason,
        }
    }
}

fn is_datacenter_isp(isp: Option<&str>, datacenter_isps: &[String]) -> bool {
    isp.map(|isp| {
        let isp_lower = isp.to_lowercase();
        datacenter_isps.iter().any(|s| isp_lower.contains(s))
    })
    .unwrap_or(false)
}

/// Pure allow/deny decision for an already-resolved country/ISP pair.
/// ISP takes precedence over country: a datacenter ISP in an otherwise
/// allow-listed country is still rejected.
fn classify_record(
    country: Option<&str>,
    isp: Option<&str>,
    allow_countries: &std::collections::HashSet<String>,
    datacenter_isps: &[String],
) -> (bool, Reason) {
    if is_datacenter_isp(isp, datacenter_isps) {
        return (false, Reason::SuspiciousIsp);
    }

    let country_ok = country.map(|c| allow_countries.contains(c)).unwrap_or(false);
    if country_ok {
        (true, Reason::Allowed)
    } else {
        (false, Reason::DisallowedCountry)
    }
}

/// Extract the client IP from request headers, preferring (in order):
/// `CF-Connecting-IP`, `X-Real-IP`, the first non-private entry of
/// `X-Forwarded-For`, then the socket peer address.
pub fn extract_client_ip(
    headers: &axum::http::HeaderMap,
    socket_ip: IpAddr,
) -> String {
    if let Some(ip) = headers
        .get("cf-connecting-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return ip.to_owned();
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return ip.to_owned();
    }

    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        for candidate in xff.split(',').map(str::trim) {
            if candidate.is_empty() {
                continue;
            }
            let stripped = candidate.strip_prefix("::ffff:").unwrap_or(candidate);
            match IpAddr::from_str(stripped) {
                Ok(addr) if !is_private(addr) => return candidate.to_owned(),
                _ => continue,
            }
        }
    }

    socket_ip.to_string()
}

/// `true` for RFC1918, loopback, link-local, and unique-local addresses.
pub fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_broadcast()
                || octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
        }
        IpAddr::V6(addr) => {
            addr.is_loopback()
                || addr.is_unspecified()
                || (addr.segments()[0] & 0xffc0) == 0xfe80
                || (addr.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn prefers_cf_connecting_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", "203.0.113.5".parse().unwrap());
        headers.insert("x-real-ip", "203.0.113.6".parse().unwrap());
        let ip = extract_client_ip(&headers, "127.0.0.1".parse().unwrap());
        assert_eq!(ip, "203.0.113.5");
    }

    #[test]
    fn skips_private_xff_entries() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "10.0.0.5, 203.0.113.7".parse().unwrap(),
        );
        let ip = extract_client_ip(&headers, "127.0.0.1".parse().unwrap());
        assert_eq!(ip, "203.0.113.7");
    }

    #[test]
    fn falls_back_to_socket_peer() {
        let headers = HeaderMap::new();
        let ip = extract_client_ip(&headers, "198.51.100.9".parse().unwrap());
        assert_eq!(ip, "198.51.100.9");
    }

    #[test]
    fn strips_ipv6_mapped_prefix() {
        assert!(!is_private("::ffff:8.8.8.8".parse::<IpAddr>().unwrap()));
    }

    fn allow_set(countries: &[&str]) -> std::collections::HashSet<String> {
        countries.iter().map(|s| s.to_uppercase()).collect()
    }

    #[test]
    fn allows_country_in_allow_list() {
        let allow = allow_set(&["VN"]);
        let datacenter_isps = vec![];
        let (ok, reason) = classify_record(Some("VN"), Some("Viettel"), &allow, &datacenter_isps);
        assert!(ok);
        assert_eq!(reason, Reason::Allowed);
    }

    #[test]
    fn rejects_country_outside_allow_list() {
        let allow = allow_set(&["VN"]);
        let datacenter_isps = vec![];
        let (ok, reason) = classify_record(Some("US"), Some("Comcast"), &allow, &datacenter_isps);
        assert!(!ok);
        assert_eq!(reason, Reason::DisallowedCountry);
    }

    #[test]
    fn isp_precedence_over_country() {
        // VN is allow-listed, but a datacenter ISP must still be rejected —
        // the ISP check runs first and wins regardless of country.
        let allow = allow_set(&["VN"]);
        let datacenter_isps = vec!["amazon".to_owned()];
        let (ok, reason) = classify_record(
            Some("VN"),
            Some("Amazon.com, Inc."),
            &allow,
            &datacenter_isps,
        );
        assert!(!ok);
        assert_eq!(reason, Reason::SuspiciousIsp);
    }

    #[test]
    fn missing_country_is_disallowed() {
        let allow = allow_set(&["VN"]);
        let datacenter_isps = vec![];
        let (ok, reason) = classify_record(None, None, &allow, &datacenter_isps);
        assert!(!ok);
        assert_eq!(reason, Reason::DisallowedCountry);
    }

    #[test]
    fn private_ranges_detected() {
        assert!(is_private("10.1.2.3".parse().unwrap()));
        assert!(is_private("192.168.1.1".parse().unwrap()));
        assert!(is_private("172.16.0.1".parse().unwrap()));
        assert!(!is_private("172.32.0.1".parse().unwrap()));
        assert!(is_private("127.0.0.1".parse().unwrap()));
        assert!(is_private("fe80::1".parse().unwrap()));
        assert!(is_private("fc00::1".parse().unwrap()));
    }
}
