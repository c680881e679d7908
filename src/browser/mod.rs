//! Browser boundary
//!
//! The crawler only needs four things from a live browser page: navigate,
//! evaluate a script, read cookies and add cookies. [`BrowserPage`] captures
//! exactly that so the rest of the crate never depends on a particular
//! automation library. [`SharedPage`] serialises every call because a page's
//! JS context is not safe for concurrent use; it is also the signing oracle.

#[cfg(feature = "browser")]
mod chrome;

#[cfg(feature = "browser")]
pub use chrome::ChromePage;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::sign::{SignError, SigningOracle};

/// Script reading the device token
const READ_B1_SCRIPT: &str = "window.localStorage.getItem('b1')";

/// Errors surfaced by the browser adapter
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Launching or attaching to the browser failed
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Navigation failed
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A script threw or returned an unusable value
    #[error("script evaluation failed: {0}")]
    Evaluate(String),

    /// Reading or writing cookies failed
    #[error("cookie operation failed: {0}")]
    Cookies(String),

    /// The crate was built without the `browser` feature
    #[error("browser support not compiled in; rebuild with --features browser")]
    NotCompiled,
}

/// A cookie as exchanged with the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: Option<String>,
}

impl BrowserCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: Some(String::from("/")),
        }
    }
}

/// One live page of an automated browser
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the load to settle
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Evaluate `script` in the page and return its JSON value
    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    /// Cookies whose domain contains `domain_filter`
    async fn cookies(&self, domain_filter: &str) -> Result<Vec<BrowserCookie>, BrowserError>;

    /// Add cookies to the page's browser context
    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), BrowserError>;

    /// Release the page and its browser
    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// Mutex-serialised access to the single live page
#[derive(Clone)]
pub struct SharedPage {
    inner: Arc<dyn BrowserPage>,
    lock: Arc<Mutex<()>>,
}

impl SharedPage {
    pub fn new(inner: Arc<dyn BrowserPage>) -> Self {
        Self {
            inner,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Read the `b1` device token from local storage (empty when unset)
    pub async fn read_b1(&self) -> Result<String, BrowserError> {
        let value = self.evaluate(READ_B1_SCRIPT).await?;
        Ok(match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

/// `window.mnsv2('<sign_str>', '<digest>')` with both arguments as JS string literals
pub fn mnsv2_script(sign_str: &str, digest: &str) -> String {
    format!(
        "window.mnsv2({}, {})",
        js_string_literal(sign_str),
        js_string_literal(digest)
    )
}

/// Quote `s` as a single-quoted JS string literal
fn js_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[async_trait]
impl BrowserPage for SharedPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let _guard = self.lock.lock().await;
        self.inner.goto(url).await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let _guard = self.lock.lock().await;
        self.inner.evaluate(script).await
    }

    async fn cookies(&self, domain_filter: &str) -> Result<Vec<BrowserCookie>, BrowserError> {
        let _guard = self.lock.lock().await;
        self.inner.cookies(domain_filter).await
    }

    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), BrowserError> {
        let _guard = self.lock.lock().await;
        self.inner.add_cookies(cookies).await
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let _guard = self.lock.lock().await;
        self.inner.close().await
    }
}

#[async_trait]
impl SigningOracle for SharedPage {
    async fn mnsv2(&self, sign_str: &str, digest: &str) -> Result<String, SignError> {
        let value = self
            .evaluate(&mnsv2_script(sign_str, digest))
            .await
            .map_err(|e| SignError::Oracle(e.to_string()))?;

        match value {
            Value::String(token) => Ok(token),
            other => Err(SignError::Oracle(format!(
                "mnsv2 returned a non-string value: {other}"
            ))),
        }
    }
}

/// Launch the configured browser and open one page
#[cfg(feature = "browser")]
pub async fn launch(config: &crate::config::BrowserConfig) -> Result<Arc<dyn BrowserPage>, BrowserError> {
    Ok(Arc::new(ChromePage::launch(config).await?))
}

/// Stub for builds without the `browser` feature
#[cfg(not(feature = "browser"))]
pub async fn launch(_config: &crate::config::BrowserConfig) -> Result<Arc<dyn BrowserPage>, BrowserError> {
    Err(BrowserError::NotCompiled)
}
