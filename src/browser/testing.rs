//! Scripted [`BrowserPage`] for unit tests

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{BrowserCookie, BrowserError, BrowserPage};

fn default_answer(script: &str) -> Value {
    if script.contains("localStorage") {
        Value::from("b1-token")
    } else {
        Value::from("mnsv2-token")
    }
}

/// Page with an in-memory cookie jar whose evaluate answers from a function
pub struct ScriptedPage {
    answer: fn(&str) -> Value,
    jar: Mutex<Vec<BrowserCookie>>,
    visited: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    closed: AtomicUsize,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self::new(default_answer)
    }
}

impl ScriptedPage {
    pub fn new(answer: fn(&str) -> Value) -> Self {
        Self {
            answer,
            jar: Mutex::new(Vec::new()),
            visited: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    pub fn with_cookies(cookies: Vec<BrowserCookie>) -> Self {
        let page = Self::default();
        for cookie in cookies {
            page.set_cookie(cookie);
        }
        page
    }

    /// Insert or replace a cookie by name
    pub fn set_cookie(&self, cookie: BrowserCookie) {
        let mut jar = self.jar.lock().unwrap();
        jar.retain(|c| c.name != cookie.name);
        jar.push(cookie);
    }

    pub fn cookie_jar(&self) -> Vec<BrowserCookie> {
        self.jar.lock().unwrap().clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    /// Highest number of overlapping evaluate calls
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok((self.answer)(script))
    }

    async fn cookies(&self, domain_filter: &str) -> Result<Vec<BrowserCookie>, BrowserError> {
        let needle = domain_filter.trim_start_matches('.');
        Ok(self
            .jar
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.domain.contains(needle))
            .cloned()
            .collect())
    }

    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), BrowserError> {
        for cookie in cookies {
            self.set_cookie(cookie.clone());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
