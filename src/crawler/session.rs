//! Shared session state
//!
//! Cookies and the signing fingerprint are read by every request, including
//! concurrent comment walks, and replaced only after (re)login. Readers take
//! a cheap `Arc` of the current snapshot; [`SessionState::refresh`] swaps the
//! whole snapshot at once so no reader ever sees cookies from one login with
//! `a1`/`b1` from another.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::browser::BrowserCookie;
use crate::sign::SignContext;
use crate::utils::convert_cookies;

/// Cookie set by the platform once a user is logged in
pub const SESSION_COOKIE: &str = "web_session";

/// Immutable view of the session at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Value for the `Cookie` header
    pub cookie_header: String,

    /// Cookie name to value
    pub cookies: HashMap<String, String>,

    /// Fingerprint used by the signer
    pub sign_context: SignContext,
}

impl SessionSnapshot {
    /// Build a snapshot from browser cookies and the `b1` device token
    pub fn from_cookies(cookies: &[BrowserCookie], b1: impl Into<String>) -> Self {
        let (cookie_header, cookies) = convert_cookies(cookies);
        let a1 = cookies.get("a1").cloned().unwrap_or_default();
        Self {
            cookie_header,
            cookies,
            sign_context: SignContext::new(a1, b1),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Holder of the current [`SessionSnapshot`]
#[derive(Debug, Default)]
pub struct SessionState {
    current: RwLock<Arc<SessionSnapshot>>,
}

impl SessionState {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The current snapshot
    pub async fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.current.read().await.clone()
    }

    /// Replace the session from freshly harvested cookies
    pub async fn refresh(&self, cookies: &[BrowserCookie], b1: impl Into<String>) {
        let snapshot = SessionSnapshot::from_cookies(cookies, b1);
        info!(
            cookies = snapshot.cookies.len(),
            has_a1 = !snapshot.sign_context.a1.is_empty(),
            has_session = snapshot.cookies.contains_key(SESSION_COOKIE),
            "Session refreshed"
        );
        *self.current.write().await = Arc::new(snapshot);
    }
}
