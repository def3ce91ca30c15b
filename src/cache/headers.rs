//! HTTP caching header parsing.
//!
//! Two expiry mechanisms are honored: freshness lifetimes from
//! `Cache-Control`/`Expires`, and revalidation via `ETag`/`Last-Modified`.

use super::entry::{now_millis, CacheEntry, Headers};
use crate::network::NetworkOutcome;
use chrono::{DateTime, TimeZone, Utc};

/// Charset assumed when `Content-Type` does not name one.
pub const DEFAULT_CONTENT_CHARSET: &str = "ISO-8859-1";

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse an RFC 1123 date into epoch milliseconds.
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Render epoch milliseconds as an RFC 1123 date.
pub fn format_http_date(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Build a cache entry from a network outcome, or `None` if the response
/// forbids caching.
pub fn parse_cache_headers(outcome: &NetworkOutcome) -> Option<CacheEntry> {
    parse_cache_headers_at(outcome, now_millis())
}

pub(crate) fn parse_cache_headers_at(outcome: &NetworkOutcome, now: i64) -> Option<CacheEntry> {
    let headers = &outcome.headers;

    let server_date = header_value(headers, "Date")
        .and_then(parse_http_date)
        .unwrap_or(0);

    let mut has_cache_control = false;
    let mut max_age: i64 = 0;
    let mut stale_while_revalidate: i64 = 0;
    let mut must_revalidate = false;

    if let Some(value) = header_value(headers, "Cache-Control") {
        has_cache_control = true;
        for token in value.split(',').map(str::trim) {
            if token == "no-cache" || token == "no-store" {
                return None;
            } else if let Some(v) = token.strip_prefix("max-age=") {
                max_age = v.parse().unwrap_or(0);
            } else if let Some(v) = token.strip_prefix("stale-while-revalidate=") {
                stale_while_revalidate = v.parse().unwrap_or(0);
            } else if token == "must-revalidate" || token == "proxy-revalidate" {
                must_revalidate = true;
            }
        }
    }

    let server_expires = header_value(headers, "Expires")
        .and_then(parse_http_date)
        .unwrap_or(0);
    let last_modified = header_value(headers, "Last-Modified")
        .and_then(parse_http_date)
        .unwrap_or(0);
    let etag = header_value(headers, "ETag").map(str::to_string);

    // Cache-Control wins over Expires, even when Expires is more restrictive.
    let (soft_expire, final_expire) = if has_cache_control {
        let soft = now.saturating_add(max_age.saturating_mul(1000));
        let hard = if must_revalidate {
            soft
        } else {
            soft.saturating_add(stale_while_revalidate.saturating_mul(1000))
        };
        (soft, hard)
    } else if server_date > 0 && server_expires >= server_date {
        let soft = now.saturating_add(server_expires - server_date);
        (soft, soft)
    } else {
        (0, 0)
    };

    let mut entry = CacheEntry::new(outcome.data.clone())
        .with_server_date(server_date)
        .with_last_modified(last_modified)
        .with_ttls(soft_expire, final_expire)
        .with_headers(headers.clone());
    entry.etag = etag;
    Some(entry)
}

/// Charset named by the `Content-Type` header, or `default`.
pub fn parse_charset(headers: &Headers, default: &str) -> String {
    header_value(headers, "Content-Type")
        .and_then(|ct| {
            ct.split(';').skip(1).find_map(|param| {
                let (name, value) = param.trim().split_once('=')?;
                (name.trim().eq_ignore_ascii_case("charset"))
                    .then(|| value.trim().trim_matches('"').to_string())
            })
        })
        .unwrap_or_else(|| default.to_string())
}

/// Conditional request headers for revalidating `entry`.
pub fn conditional_headers(entry: Option<&CacheEntry>) -> Headers {
    let mut headers = Headers::new();
    let Some(entry) = entry else {
        return headers;
    };
    if let Some(etag) = &entry.etag {
        headers.insert("If-None-Match".to_string(), etag.clone());
    }
    if entry.last_modified > 0 {
        headers.insert(
            "If-Modified-Since".to_string(),
            format_http_date(entry.last_modified),
        );
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(pairs: &[(&str, &str)]) -> NetworkOutcome {
        let headers = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NetworkOutcome::new(200, "body", headers)
    }

    #[test]
    fn test_no_store_is_not_cacheable() {
        assert!(parse_cache_headers(&outcome(&[("Cache-Control", "no-store")])).is_none());
        assert!(parse_cache_headers(&outcome(&[("cache-control", "public, no-cache")])).is_none());
    }

    #[test]
    fn test_max_age_with_stale_while_revalidate() {
        let now = 1_000_000;
        let entry = parse_cache_headers_at(
            &outcome(&[("Cache-Control", "max-age=60, stale-while-revalidate=30")]),
            now,
        )
        .unwrap();
        assert_eq!(entry.soft_ttl, now + 60_000);
        assert_eq!(entry.ttl, now + 90_000);
    }

    #[test]
    fn test_must_revalidate_drops_stale_window() {
        let now = 5_000;
        let entry = parse_cache_headers_at(
            &outcome(&[(
                "Cache-Control",
                "max-age=10, stale-while-revalidate=30, must-revalidate",
            )]),
            now,
        )
        .unwrap();
        assert_eq!(entry.soft_ttl, entry.ttl);
        assert_eq!(entry.ttl, now + 10_000);
    }

    #[test]
    fn test_huge_max_age_saturates() {
        let now = 1_000_000;
        let entry = parse_cache_headers_at(
            &outcome(&[(
                "Cache-Control",
                "max-age=9223372036854775807, stale-while-revalidate=9223372036854775807",
            )]),
            now,
        )
        .unwrap();
        assert_eq!(entry.soft_ttl, i64::MAX);
        assert_eq!(entry.ttl, i64::MAX);
        assert!(!entry.refresh_needed());
    }

    #[test]
    fn test_expires_relative_to_server_date() {
        let now = 42;
        let entry = parse_cache_headers_at(
            &outcome(&[
                ("Date", "Sun, 06 Nov 1994 08:49:37 GMT"),
                ("Expires", "Sun, 06 Nov 1994 08:50:37 GMT"),
                ("ETag", "\"abc\""),
            ]),
            now,
        )
        .unwrap();
        assert_eq!(entry.soft_ttl, now + 60_000);
        assert_eq!(entry.ttl, now + 60_000);
        assert_eq!(entry.server_date, 784_111_777_000);
        assert_eq!(entry.etag.as_deref(), Some("\"abc\""));
        assert_eq!(&entry.data[..], b"body");
    }

    #[test]
    fn test_no_freshness_info_is_immediately_stale() {
        let entry = parse_cache_headers(&outcome(&[])).unwrap();
        assert!(entry.is_expired());
        assert!(entry.refresh_needed());
    }

    #[test]
    fn test_http_date_round_trip() {
        let millis = 784_111_777_000;
        let text = format_http_date(millis);
        assert_eq!(text, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date(&text), Some(millis));
        assert_eq!(parse_http_date("not a date"), None);
    }

    #[test]
    fn test_parse_charset() {
        let mut headers = Headers::new();
        assert_eq!(parse_charset(&headers, "utf-8"), "utf-8");
        headers.insert(
            "content-type".into(),
            "text/html; charset=\"UTF-8\"".into(),
        );
        assert_eq!(parse_charset(&headers, DEFAULT_CONTENT_CHARSET), "UTF-8");
    }

    #[test]
    fn test_conditional_headers() {
        assert!(conditional_headers(None).is_empty());
        let entry = CacheEntry::new("x")
            .with_etag("\"e1\"")
            .with_last_modified(784_111_777_000);
        let headers = conditional_headers(Some(&entry));
        assert_eq!(headers.get("If-None-Match").map(String::as_str), Some("\"e1\""));
        assert_eq!(
            headers.get("If-Modified-Since").map(String::as_str),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
    }
}
