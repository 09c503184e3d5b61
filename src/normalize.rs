//! Field normalization: names, tripcodes, contact links, dates, addresses.

use std::net::IpAddr;
use std::sync::OnceLock;

use chrono::DateTime;

use md5::{Digest, Md5};

use regex::Regex;

use crate::config::DateStyle;

/// How many digest characters a tripcode keeps.
const TRIP_LEN: usize = 10;

/// Whether a field contains a line break, which no single-line field may.
pub fn has_crlf(s: &str) -> bool {
    s.contains('\n') || s.contains('\r')
}

/// Escape a plain-text field for embedding in markup.
pub fn clean_string(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Reduce comment markup to a safe subset.
pub fn sanitize_comment(s: &str) -> String {
    ammonia::clean(s)
}

/// Split a tripcode secret off a name field and derive the code.
///
/// `name#secret` becomes the display name plus a short digest of the
/// secret, marked and salted with the board's tripkey. A name without a
/// secret passes through with an empty code.
pub fn process_tripcode(name: &str, tripkey: &str) -> (String, String) {
    match name.split_once('#') {
        Some((display, secret)) if !secret.is_empty() => {
            let mut hasher = Md5::new();
            hasher.update(secret.as_bytes());
            hasher.update(tripkey.as_bytes());

            let digest: String = hasher
                .finalize()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect();

            (
                display.to_string(),
                format!("{}{}", tripkey, &digest[..TRIP_LEN]),
            )
        }
        _ => (name.to_string(), String::new()),
    }
}

fn scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^\w+:)|(?:://)").expect("scheme regex is valid")
    })
}

/// Normalize a contact field into a link form.
///
/// Anything that isn't already a URI gets a `mailto:` prefix; sage goes
/// through like any other value and is recognized downstream in either
/// form.
pub fn normalize_email(email: &str) -> String {
    if email.is_empty() || scheme_regex().is_match(email) {
        email.to_string()
    } else {
        format!("mailto:{}", email)
    }
}

/// Whether a normalized contact field marks the post as sage.
pub fn is_sage(email: &str) -> bool {
    email.eq_ignore_ascii_case("sage") || email.eq_ignore_ascii_case("mailto:sage")
}

/// Format an epoch-millisecond timestamp for display.
pub fn format_date(ts_ms: i64, style: DateStyle) -> String {
    let Some(dt) = DateTime::from_timestamp_millis(ts_ms) else {
        return String::new();
    };

    match style {
        DateStyle::Futaba => dt.format("%y/%m/%d(%a)%H:%M").to_string(),
        DateStyle::Iso => dt.format("%F %R").to_string(),
        DateStyle::Http => dt.to_rfc2822(),
    }
}

/// Encode an address as the decimal string the post table stores.
pub fn encode_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => u32::from(v4).to_string(),
        IpAddr::V6(v6) => u128::from(v6).to_string(),
    }
}

/// Parse an address given as either a dotted/colon form or the stored
/// decimal form.
pub fn parse_ip_value(s: &str) -> Option<u128> {
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Some(match ip {
            IpAddr::V4(v4) => u32::from(v4) as u128,
            IpAddr::V6(v6) => u128::from(v6),
        });
    }

    s.parse::<u128>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tripcode_is_deterministic_and_split() {
        let (name, trip) = process_tripcode("poster#secret", "!");

        assert_eq!(name, "poster");
        assert!(trip.starts_with('!'));
        assert_eq!(trip.len(), 1 + TRIP_LEN);
        assert_eq!(trip, process_tripcode("poster#secret", "!").1);
        assert_ne!(trip, process_tripcode("poster#other", "!").1);
    }

    #[test]
    fn name_without_secret_has_no_trip() {
        let (name, trip) = process_tripcode("plain name", "!");

        assert_eq!(name, "plain name");
        assert!(trip.is_empty());
    }

    #[test]
    fn email_gets_mailto_prefix() {
        assert_eq!(normalize_email("user@example.org"), "mailto:user@example.org");
        assert_eq!(normalize_email("sage"), "mailto:sage");
        assert_eq!(normalize_email("https://example.org"), "https://example.org");
        assert_eq!(normalize_email(""), "");
    }

    #[test]
    fn sage_recognized_in_either_form() {
        assert!(is_sage("sage"));
        assert!(is_sage("mailto:sage"));
        assert!(is_sage("mailto:SAGE"));
        assert!(!is_sage("mailto:stage"));
    }

    #[test]
    fn clean_string_escapes_markup() {
        assert_eq!(
            clean_string(r#"<b>"a"&'b'</b>"#),
            "&lt;b&gt;&quot;a&quot;&amp;&#39;b&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn encode_ip_matches_decimal_form() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert_eq!(encode_ip(ip), "2130706433");
        assert_eq!(parse_ip_value("127.0.0.1"), Some(2130706433));
        assert_eq!(parse_ip_value("2130706433"), Some(2130706433));
        assert_eq!(parse_ip_value("not an ip"), None);
    }
}
