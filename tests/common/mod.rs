//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rednote::browser::{BrowserCookie, BrowserError, BrowserPage, SharedPage};
use rednote::crawler::client::{ClientOptions, SignedClient};
use rednote::crawler::login::COOKIE_DOMAIN;
use rednote::crawler::session::{SessionSnapshot, SessionState};
use rednote::sign::Signer;
use rednote::utils::cancel::CancelToken;
use rednote::utils::retry::RetryConfig;

/// Browser page that answers every script with a fixed token
#[derive(Default)]
pub struct StaticPage {
    cookies: Mutex<Vec<BrowserCookie>>,
    visited: Mutex<Vec<String>>,
}

impl StaticPage {
    pub fn with_session() -> Self {
        Self {
            cookies: Mutex::new(session_cookies()),
            visited: Mutex::new(Vec::new()),
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserPage for StaticPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        if script.contains("localStorage") {
            return Ok(json!("b1-device"));
        }
        Ok(json!("mnsv2-token"))
    }

    async fn cookies(&self, domain_filter: &str) -> Result<Vec<BrowserCookie>, BrowserError> {
        let filter = domain_filter.trim_start_matches('.');
        Ok(self
            .cookies
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.domain.contains(filter))
            .cloned()
            .collect())
    }

    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), BrowserError> {
        self.cookies.lock().unwrap().extend_from_slice(cookies);
        Ok(())
    }
}

pub fn session_cookies() -> Vec<BrowserCookie> {
    vec![
        BrowserCookie::new("a1", "a1-value", COOKIE_DOMAIN),
        BrowserCookie::new("web_session", "session-value", COOKIE_DOMAIN),
    ]
}

/// Logged-in session matching [`session_cookies`]
pub fn logged_in_session() -> Arc<SessionState> {
    Arc::new(SessionState::new(SessionSnapshot::from_cookies(
        &session_cookies(),
        "b1-device",
    )))
}

/// Options pointed at a mock server with fast retries and no throttling
pub fn mock_options(base_url: &str) -> ClientOptions {
    ClientOptions {
        timeout: Duration::from_millis(500),
        requests_per_second: 1000,
        retry: RetryConfig::with_delays(2, 10, 50).without_jitter(),
        user_agent: Some("rednote-test".to_string()),
        ..ClientOptions::default()
    }
    .with_base_url(base_url)
}

/// Signed client against `base_url` using a [`StaticPage`] as oracle
pub fn signed_client(base_url: &str) -> SignedClient {
    signed_client_with(mock_options(base_url))
}

pub fn signed_client_with(options: ClientOptions) -> SignedClient {
    let page = SharedPage::new(Arc::new(StaticPage::with_session()));
    SignedClient::new(
        Signer::new(Arc::new(page)),
        logged_in_session(),
        options,
        CancelToken::never(),
    )
    .unwrap()
}

/// Successful API envelope around `data`
pub fn ok_envelope(data: Value) -> Value {
    json!({"success": true, "code": 0, "msg": "成功", "data": data})
}

/// Failed API envelope with `code`
pub fn error_envelope(code: i64, msg: &str) -> Value {
    json!({"success": false, "code": code, "msg": msg, "data": null})
}
