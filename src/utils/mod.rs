//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod cancel;
pub mod error;
pub mod retry;

use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

use crate::browser::BrowserCookie;

/// Current unix time in milliseconds
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Truncate text to a maximum length (in characters)
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Parse a display count such as `"1.2万"`, `"3千"` or `"10+"` into an integer
///
/// Unparseable input yields 0.
pub fn parse_count(raw: &str) -> u64 {
    let text = raw.trim().trim_end_matches('+');
    if text.is_empty() {
        return 0;
    }

    let (number, multiplier) = if let Some(n) = text.strip_suffix('万') {
        (n, 10_000.0)
    } else if let Some(n) = text.strip_suffix('w').or_else(|| text.strip_suffix('W')) {
        (n, 10_000.0)
    } else if let Some(n) = text.strip_suffix('千') {
        (n, 1_000.0)
    } else if let Some(n) = text.strip_suffix('亿') {
        (n, 100_000_000.0)
    } else {
        (text, 1.0)
    };

    number
        .trim()
        .replace(',', "")
        .parse::<f64>()
        .map(|n| (n * multiplier).round() as u64)
        .unwrap_or(0)
}

/// Encode a number in upper-case base 36
pub fn base36_encode(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if value == 0 {
        return String::from("0");
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Generate a search session id: `base36((unix_ms << 64) + rand)`
pub fn generate_search_id() -> String {
    let millis = unix_millis().max(0) as u128;
    let salt: u128 = rand::thread_rng().gen_range(0..2_147_483_646u128);
    base36_encode((millis << 64) + salt)
}

/// Pick a random duration within `[min, max]`
pub fn random_duration(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Flatten browser cookies into a `Cookie` header value and a name lookup
///
/// Later cookies with the same name override earlier ones in the map; the
/// header keeps the browser's order.
pub fn convert_cookies(cookies: &[BrowserCookie]) -> (String, HashMap<String, String>) {
    let mut map = HashMap::with_capacity(cookies.len());
    let header = cookies
        .iter()
        .map(|c| {
            map.insert(c.name.clone(), c.value.clone());
            format!("{}={}", c.name, c.value)
        })
        .collect::<Vec<_>>()
        .join("; ");
    (header, map)
}

/// Parse a `k=v; k2=v2` cookie string into ordered pairs
pub fn parse_cookie_string(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
