//! HTTP header construction
//!
//! Static browser-mimicking headers for the API and web hosts, the
//! user-agent pool, and conversion of [`SignatureHeaders`] into a header map.

use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, ORIGIN,
    REFERER, USER_AGENT,
};

use crate::sign::SignatureHeaders;

/// Web origin the API expects requests to come from
pub const WEB_ORIGIN: &str = "https://www.xiaohongshu.com";

/// Pool of realistic desktop User-Agent strings
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

/// Pick a user agent from the pool
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}

fn insert_static(headers: &mut HeaderMap, name: &'static str, value: &'static str) {
    headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
}

/// Static headers for JSON API calls
///
/// An unusable `user_agent` (control characters) is left out rather than
/// failing the request.
pub fn build_api_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, ua);
    }
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json;charset=UTF-8"),
    );
    headers.insert(ORIGIN, HeaderValue::from_static(WEB_ORIGIN));
    headers.insert(REFERER, HeaderValue::from_static("https://www.xiaohongshu.com/"));

    insert_static(&mut headers, "sec-ch-ua-mobile", "?0");
    insert_static(&mut headers, "sec-ch-ua-platform", "\"macOS\"");
    insert_static(&mut headers, "sec-fetch-dest", "empty");
    insert_static(&mut headers, "sec-fetch-mode", "cors");
    insert_static(&mut headers, "sec-fetch-site", "same-site");

    headers
}

/// Headers for fetching a web page (HTML fallback, creator profile)
pub fn build_page_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, ua);
    }
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.xiaohongshu.com/"));

    insert_static(&mut headers, "sec-fetch-dest", "document");
    insert_static(&mut headers, "sec-fetch-mode", "navigate");
    insert_static(&mut headers, "sec-fetch-site", "same-origin");
    insert_static(&mut headers, "upgrade-insecure-requests", "1");

    headers
}

/// Add the session cookie string; an unusable value is skipped
pub fn insert_cookie(headers: &mut HeaderMap, cookie_header: &str) {
    if cookie_header.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(cookie_header) {
        headers.insert(COOKIE, value);
    }
}

/// `X-S`, `X-T`, `x-S-Common` and `X-B3-Traceid`
pub fn signature_header_map(sig: &SignatureHeaders) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let pairs = [
        ("x-s", &sig.xs),
        ("x-t", &sig.xt),
        ("x-s-common", &sig.xs_common),
        ("x-b3-traceid", &sig.trace_id),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}
