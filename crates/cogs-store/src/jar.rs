//! Wire-format helpers for the cookie-style medium.
//!
//! An entry on the wire is
//! `"<key>=<percent-encoded-json>; expires=<HTTP-date>; path=<path>[; domain=<d>][; secure]"`.
//! `days == 0` omits `expires` entirely (session-scoped).

use chrono::{DateTime, Duration, Utc};
use cogs_core::HTTP_DATE_FORMAT;

use crate::types::WriteOptions;

/// Build one full write string for the medium.
pub fn format_entry(key: &str, json_text: &str, options: &WriteOptions, now: DateTime<Utc>) -> String {
    let encoded = urlencoding::encode(json_text);
    let mut entry = format!("{key}={encoded}");

    if options.days != 0 {
        let at = now + Duration::days(i64::from(options.days));
        entry.push_str(&format!("; expires={}", at.format(HTTP_DATE_FORMAT)));
    }
    entry.push_str(&format!("; path={}", options.path));
    if let Some(domain) = &options.domain {
        entry.push_str(&format!("; domain={domain}"));
    }
    if options.secure {
        entry.push_str("; secure");
    }
    entry
}

/// Find `key` in the medium's full contents and return its decoded raw text.
///
/// Segments are trimmed of leading spaces and matched on the `"<key>="`
/// prefix. A value that fails percent-decoding is returned undecoded rather
/// than dropped.
pub fn lookup(all: &str, key: &str) -> Option<String> {
    let prefix = format!("{key}=");
    for segment in all.split(';') {
        let segment = segment.trim_start();
        if let Some(raw) = segment.strip_prefix(prefix.as_str()) {
            return Some(
                urlencoding::decode(raw)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| raw.to_string()),
            );
        }
    }
    None
}
